//! ConvertMorph core: compression routing, in-process PDF compression, and
//! bounded background job dispatch.
//!
//! Three domains make up the crate: `routing` decides where a document
//! should be compressed, `compression` is the in-process engine, and
//! `dispatch` runs compression/merge/split/convert jobs on a bounded worker
//! pool.

// Public modules
pub mod domains;
pub mod errors;

// Commonly used entry points
pub use domains::compression::{
    compress, CompressionLevel, CompressionOptions, CompressionResult, CompressionStage,
    StageProgress,
};
pub use domains::dispatch::{PoolConfig, PoolStats, WorkerPool};
pub use domains::routing::{
    analyze, choose, validate, CompressionDecision, CompressionMethod, FileAnalysis,
    MethodPreference,
};

/// Initialize logging for embedding applications and tests.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
