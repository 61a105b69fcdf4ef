// Declare submodules for the compression domain
pub mod engine;
pub mod images;
pub mod types;

// Re-export key types
pub use types::{
    CompressionLevel, CompressionOptions, CompressionResult, CompressionStage, LevelProfile,
    StageProgress,
};

pub use engine::{compress, MetadataWarning, ProgressFn};
