//! Compression routing: document analysis and method selection.
//!
//! The analyzer classifies an input buffer, the selector maps that
//! classification (plus an optional caller preference) to the backend that
//! should process it.

pub mod analyzer;
pub mod selector;
pub mod types;

pub use analyzer::analyze;
pub use selector::{choose, estimate_time, validate};
pub use types::{
    CompressionDecision, CompressionMethod, Complexity, FileAnalysis, MethodPreference,
    MethodValidation,
};
