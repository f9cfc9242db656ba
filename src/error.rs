use std::fmt;

pub type LargeBwtResult<T> = Result<T, LargeBwtError>;

const MIB: u64 = 1024 * 1024;

/// Errors that abort a BWT construction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LargeBwtError {
    /// A single bucket holds more suffixes than the host staging buffer
    BufferOverflow {
        bucket_index: u32,
        bucket_size: u64,
        capacity: u64,
    },
    /// A bucket could not be split to fit the device budget at any radix width
    LargeBucket {
        bucket_index: u32,
        bucket_size: u64,
        suggested_device_memory: u64,
    },
    /// The allocator refused a scratch reservation
    AllocationFailed { buffer: &'static str, bytes: u64 },
    /// A scratch reservation would push a memory scope over its budget
    BudgetExceeded {
        scope: &'static str,
        buffer: &'static str,
        requested: u64,
        budget: u64,
    },
    InvalidParams(String),
    InvalidInput(String),
    ThreadPool(String),
}

impl LargeBwtError {
    pub(crate) fn large_bucket(bucket_index: u32, bucket_size: u64, bytes_per_suffix: u64) -> Self {
        // rounded up to whole MiB
        let mib = (bucket_size * bytes_per_suffix).div_ceil(MIB);

        LargeBwtError::LargeBucket {
            bucket_index,
            bucket_size,
            suggested_device_memory: mib * MIB,
        }
    }
}

impl fmt::Display for LargeBwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LargeBwtError::BufferOverflow {
                bucket_index,
                bucket_size,
                capacity,
            } => write!(
                f,
                "bucket {} contains {} suffixes: buffer overflow! (host staging holds {})",
                bucket_index, bucket_size, capacity
            ),
            LargeBwtError::LargeBucket {
                bucket_index,
                bucket_size,
                suggested_device_memory,
            } => write!(
                f,
                "subbucket {} contains {} suffixes: buffer overflow! please try increasing \
                 the device memory limit to at least {} MB",
                bucket_index,
                bucket_size,
                suggested_device_memory / MIB
            ),
            LargeBwtError::AllocationFailed { buffer, bytes } => {
                write!(f, "failed to allocate {} bytes for {}", bytes, buffer)
            }
            LargeBwtError::BudgetExceeded {
                scope,
                buffer,
                requested,
                budget,
            } => write!(
                f,
                "{} memory budget exceeded while reserving {}: {} of {} bytes",
                scope, buffer, requested, budget
            ),
            LargeBwtError::InvalidParams(msg) => write!(f, "invalid parameters: {}", msg),
            LargeBwtError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            LargeBwtError::ThreadPool(msg) => write!(f, "thread pool error: {}", msg),
        }
    }
}

impl std::error::Error for LargeBwtError {}

impl From<rayon::ThreadPoolBuildError> for LargeBwtError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        LargeBwtError::ThreadPool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_bucket_suggestion_rounds_up() {
        let error = LargeBwtError::large_bucket(7, 100_000, 40);

        assert_eq!(
            error,
            LargeBwtError::LargeBucket {
                bucket_index: 7,
                bucket_size: 100_000,
                suggested_device_memory: 4 * MIB,
            }
        );
        assert!(error.to_string().contains("at least 4 MB"));
    }
}
