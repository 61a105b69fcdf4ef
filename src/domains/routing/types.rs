//! Type definitions for the compression-routing domain.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{DomainError, ValidationError};

/// Bytes-per-page threshold above which a document is considered image-heavy.
pub const IMAGE_HEAVY_BYTES_PER_PAGE: u64 = 500 * 1024;

/// Bytes-per-page threshold below which a document is considered text-heavy.
pub const TEXT_HEAVY_BYTES_PER_PAGE: u64 = 50 * 1024;

/// Where a compression job should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// In-process compression on the user's own device
    ClientSide,

    /// Upload to the server-side pipeline
    ServerSide,
}

impl CompressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMethod::ClientSide => "client-side",
            CompressionMethod::ServerSide => "server-side",
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client-side" | "client" => Ok(CompressionMethod::ClientSide),
            "server-side" | "server" => Ok(CompressionMethod::ServerSide),
            _ => Err(DomainError::Validation(ValidationError::custom(&format!(
                "Invalid compression method: {}",
                s
            )))),
        }
    }
}

/// Caller preference that overrides the heuristic cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodPreference {
    /// Keep the file on-device no matter what
    Privacy,

    /// Fastest wall-clock result, even if the file leaves the device
    Performance,
}

impl FromStr for MethodPreference {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "privacy" => Ok(MethodPreference::Privacy),
            "performance" => Ok(MethodPreference::Performance),
            _ => Err(DomainError::Validation(ValidationError::custom(&format!(
                "Invalid method preference: {}",
                s
            )))),
        }
    }
}

/// Document complexity tier, derived from the page-weight classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

/// Snapshot of one input document, recomputed per request and then discarded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub pages: u32,
    pub size_mb: f64,
    pub is_image_heavy: bool,
    pub is_text_heavy: bool,
    pub complexity: Complexity,
}

/// Outcome of the method cascade for one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionDecision {
    pub method: CompressionMethod,
    pub reason: String,
    pub estimated_time: String,
    pub recommendation: String,
}

/// Guard applied after a method is finalized, to catch user overrides that
/// exceed the chosen backend's limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodValidation {
    pub valid: bool,
    pub warning: Option<String>,
}

impl MethodValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            warning: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            warning: Some(message.into()),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            warning: Some(message.into()),
        }
    }
}
