// Declare submodules for the dispatch domain
pub mod operations;
pub mod pool;
pub mod types;

// Re-export key types
pub use types::{
    CompressOutput, ConvertOutput, JobOutput, JobRequest, MergeOutput, PageAssembly, PageRange,
    PoolConfig, PoolStats, ProgressHandler, RasterFormat, SplitOutput,
};

pub use operations::{JobRunner, OperationRunner};
pub use pool::WorkerPool;
