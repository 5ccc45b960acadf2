//! Fixed capacity cell pools with a free list and a bounded mark and sweep collector. The heap
//! never grows: [Heap::allocate] reports exhaustion and the caller decides whether to collect.

use crate::config::{Config, BUFFER_SIZE};
use crate::error::ErrorCode;
use crate::value::{BufferId, Cell, Compressed, Data, Handle, HeapId, Tag};

/// Backing storage of a `data_buffer` value. Zero filled, so running off the end of compiled code
/// lands on the `fatal` opcode.
#[derive(Debug)]
pub struct Buffer {
    pub bytes: Box<[u8]>,
    pub used: usize,
    pub owner: Option<Compressed>,
    in_use: bool,
}

impl Buffer {
    fn new() -> Self {
        Self {
            bytes: vec![0; BUFFER_SIZE].into_boxed_slice(),
            used: 0,
            owner: None,
            in_use: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.used
    }
}

pub struct Heap {
    id: HeapId,
    pools: Vec<Box<[Cell]>>,
    free: Option<Compressed>,
    live: usize,
    buffers: Vec<Buffer>,
    nil: Handle,
    oom: Handle,
}

impl Heap {
    /// Builds the pools described by an already validated [Config].
    pub fn new(config: &Config) -> Self {
        let id = HeapId::fresh();
        let free_cell = Cell {
            data: Data::Free { next: None },
            alive: false,
            mark: false,
        };

        let mut pools = (0..config.pools)
            .map(|_| vec![free_cell; config.pool_size].into_boxed_slice())
            .collect::<Vec<_>>();

        let nil = Compressed::new(0, 0);
        let oom = Compressed::new(0, 1);

        pools[0][0] = Cell {
            data: Data::Nil,
            alive: true,
            mark: false,
        };
        pools[0][1] = Cell {
            data: Data::Error {
                code: ErrorCode::OutOfMemory,
                context: nil,
            },
            alive: true,
            mark: false,
        };

        // Thread the free list so the lowest slots are handed out first.
        let mut free = None;
        for pool in (0..config.pools).rev() {
            for offset in (0..config.pool_size).rev() {
                if pool == 0 && offset < 2 {
                    continue;
                }
                pools[pool][offset].data = Data::Free { next: free };
                free = Some(Compressed::new(pool, offset));
            }
        }

        Self {
            id,
            pools,
            free,
            live: 2,
            buffers: (0..config.buffers).map(|_| Buffer::new()).collect(),
            nil: Handle { heap: id, slot: nil },
            oom: Handle { heap: id, slot: oom },
        }
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn nil(&self) -> Handle {
        self.nil
    }

    /// The preallocated error returned when allocation fails for good.
    pub fn oom(&self) -> Handle {
        self.oom
    }

    pub fn capacity(&self) -> usize {
        self.pools.iter().map(|pool| pool.len()).sum()
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Takes a cell from the free list, or `None` when every pool is exhausted.
    pub fn allocate(&mut self, data: Data) -> Option<Handle> {
        let slot = self.free?;
        let cell = self.cell_mut(slot);

        let Data::Free { next } = cell.data else {
            panic!("free list points at a live cell {slot:?}");
        };

        *cell = Cell {
            data,
            alive: true,
            mark: false,
        };

        self.free = next;
        self.live += 1;

        Some(Handle {
            heap: self.id,
            slot,
        })
    }

    fn cell(&self, slot: Compressed) -> &Cell {
        &self.pools[slot.pool()][slot.offset()]
    }

    fn cell_mut(&mut self, slot: Compressed) -> &mut Cell {
        &mut self.pools[slot.pool()][slot.offset()]
    }

    pub fn compress(&self, handle: Handle) -> Compressed {
        assert_eq!(handle.heap, self.id, "handle used with a foreign heap");
        handle.slot
    }

    pub fn decompress(&self, slot: Compressed) -> Handle {
        assert!(
            slot.pool() < self.pools.len() && slot.offset() < self.pools[slot.pool()].len(),
            "compressed pointer {slot:?} outside of the heap"
        );
        Handle {
            heap: self.id,
            slot,
        }
    }

    pub fn data(&self, handle: Handle) -> &Data {
        &self.cell(self.compress(handle)).data
    }

    pub fn data_mut(&mut self, handle: Handle) -> &mut Data {
        let slot = self.compress(handle);
        &mut self.cell_mut(slot).data
    }

    pub fn tag(&self, handle: Handle) -> Tag {
        self.data(handle).tag()
    }

    /// Claims an unused scratch buffer.
    pub fn claim_buffer(&mut self) -> Option<BufferId> {
        let index = self.buffers.iter().position(|buffer| !buffer.in_use)?;
        self.buffers[index].in_use = true;
        Some(BufferId(index as u8))
    }

    pub fn release_buffer(&mut self, id: BufferId) {
        let buffer = &mut self.buffers[id.0 as usize];
        buffer.bytes.fill(0);
        buffer.used = 0;
        buffer.owner = None;
        buffer.in_use = false;
    }

    pub fn buffer(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.0 as usize]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer {
        &mut self.buffers[id.0 as usize]
    }

    pub fn buffers(&self) -> impl Iterator<Item = (BufferId, &Buffer)> {
        self.buffers
            .iter()
            .enumerate()
            .filter(|(_, buffer)| buffer.in_use)
            .map(|(index, buffer)| (BufferId(index as u8), buffer))
    }

    /// Marks everything reachable from `roots` and reclaims the rest. Returns the number of cells
    /// returned to the free list.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Handle>) -> usize {
        let mut worklist = vec![self.nil.slot, self.oom.slot];
        worklist.extend(roots.into_iter().map(|root| self.compress(root)));

        while let Some(slot) = worklist.pop() {
            let cell = self.cell_mut(slot);
            if cell.mark || !cell.alive {
                continue;
            }
            cell.mark = true;
            worklist.extend(cell.data.children().into_iter().flatten());
        }

        let mut reclaimed = 0;

        for pool in 0..self.pools.len() {
            for offset in 0..self.pools[pool].len() {
                let slot = Compressed::new(pool, offset);
                let cell = &mut self.pools[pool][offset];

                if !cell.alive {
                    continue;
                }

                if cell.mark {
                    cell.mark = false;
                    continue;
                }

                let released = match cell.data {
                    Data::DataBuffer(id) => Some(id),
                    _ => None,
                };

                cell.data = Data::Free { next: self.free };
                cell.alive = false;
                self.free = Some(slot);
                self.live -= 1;
                reclaimed += 1;

                if let Some(id) = released {
                    self.release_buffer(id);
                }
            }
        }

        log::debug!("collected {reclaimed} cells, {} live", self.live);

        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Heap {
        Heap::new(&Config {
            pool_size: 8,
            pools: 2,
            ..Config::default()
        })
    }

    #[test]
    fn nil_and_oom_are_resident() {
        let heap = small();

        assert_eq!(heap.tag(heap.nil()), Tag::Nil);
        assert_eq!(heap.tag(heap.oom()), Tag::Error);
        assert_eq!(heap.live(), 2);
    }

    #[test]
    fn allocation_spans_pools_then_fails() {
        let mut heap = small();

        let handles = (0..14)
            .map(|n| heap.allocate(Data::Integer(n)))
            .collect::<Option<Vec<_>>>()
            .unwrap();

        assert_eq!(heap.compress(handles[13]).pool(), 1);
        assert!(heap.allocate(Data::Integer(99)).is_none());
    }

    #[test]
    fn collect_keeps_reachable_cells() {
        let mut heap = small();

        let one = heap.allocate(Data::Integer(1)).unwrap();
        let two = heap.allocate(Data::Integer(2)).unwrap();
        let _garbage = heap.allocate(Data::Integer(3)).unwrap();
        let pair = heap
            .allocate(Data::Cons {
                car: heap.compress(one),
                cdr: heap.compress(two),
            })
            .unwrap();

        assert_eq!(heap.collect([pair]), 1);
        assert_eq!(heap.live(), 5);
        assert!(matches!(heap.data(one), Data::Integer(1)));
    }

    #[test]
    fn sweeping_a_buffer_releases_it() {
        let mut heap = small();

        let id = heap.claim_buffer().unwrap();
        heap.buffer_mut(id).bytes[0] = 21;
        heap.buffer_mut(id).used = 1;
        heap.allocate(Data::DataBuffer(id)).unwrap();

        heap.collect([]);

        assert_eq!(heap.buffer(id).used, 0);
        assert_eq!(heap.buffer(id).bytes[0], 0);
        assert_eq!(heap.buffers().count(), 0);
    }

    #[test]
    #[should_panic]
    fn foreign_handles_are_rejected() {
        let heap = small();
        let other = small();

        heap.tag(other.nil());
    }
}
