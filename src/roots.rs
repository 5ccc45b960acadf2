use crate::value::Handle;

/// Token for a protected value. Must be handed back to [RootList::release] in reverse order of
/// acquisition.
#[derive(Debug)]
#[must_use = "a protected root must be released"]
pub struct Protected {
    index: usize,
}

/// Stack of values the collector must treat as reachable.
#[derive(Debug, Default)]
pub struct RootList {
    roots: Vec<Handle>,
}

impl RootList {
    pub fn protect(&mut self, value: Handle) -> Protected {
        self.roots.push(value);
        Protected {
            index: self.roots.len() - 1,
        }
    }

    pub fn release(&mut self, root: Protected) {
        debug_assert_eq!(
            root.index + 1,
            self.roots.len(),
            "protected roots released out of order"
        );
        self.roots.truncate(root.index);
    }

    pub fn get(&self, root: &Protected) -> Handle {
        self.roots[root.index]
    }

    pub fn set(&mut self, root: &Protected, value: Handle) {
        self.roots[root.index] = value;
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.roots.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.roots.iter().copied()
    }
}
