//! Fixed capacities of an interpreter [crate::Context]. Nothing grows past these numbers once the
//! context is built.

use crate::error::ConfigError;
use crate::value::Compressed;

/// Size in bytes of every scratch data buffer.
pub const BUFFER_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cells per pool.
    pub pool_size: usize,

    /// Number of pools, addressed by the selector bits of a compressed pointer.
    pub pools: usize,

    pub stack_size: usize,
    pub globals: usize,
    pub intern_bytes: usize,

    /// Number of [BUFFER_SIZE] scratch buffers backing `data_buffer` values.
    pub buffers: usize,

    /// Deepest nesting of evaluations and script function calls.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 4096,
            pools: 1,
            stack_size: 512,
            globals: 128,
            intern_bytes: 1999,
            buffers: 4,
            max_depth: 128,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // nil and the out of memory error are always resident.
        let min = 2;

        if self.pool_size < min || self.pool_size > Compressed::MAX_OFFSET + 1 {
            return Err(ConfigError::PoolSize {
                min,
                max: Compressed::MAX_OFFSET + 1,
                got: self.pool_size,
            });
        }

        if self.pools == 0 || self.pools > Compressed::MAX_POOLS {
            return Err(ConfigError::PoolCount {
                max: Compressed::MAX_POOLS,
                got: self.pools,
            });
        }

        if self.intern_bytes == 0 || self.intern_bytes > u16::MAX as usize {
            return Err(ConfigError::InternBytes {
                max: u16::MAX as usize,
                got: self.intern_bytes,
            });
        }

        if self.buffers > u8::MAX as usize {
            return Err(ConfigError::Buffers {
                max: u8::MAX as usize,
                got: self.buffers,
            });
        }

        if self.stack_size == 0 {
            return Err(ConfigError::Zero("stack size"));
        }

        if self.globals == 0 {
            return Err(ConfigError::Zero("global table size"));
        }

        if self.max_depth == 0 {
            return Err(ConfigError::Zero("maximum depth"));
        }

        Ok(())
    }
}
