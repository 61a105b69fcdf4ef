//! Type definitions for the client-side compression domain.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{DomainError, ValidationError};

/// Aggressiveness presets for in-process PDF compression.
///
/// Levels are strictly ordered: each step down the list lowers the image
/// quality and DPI targets and batches more objects per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    Light,
    Medium,
    Strong,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Light => "light",
            CompressionLevel::Medium => "medium",
            CompressionLevel::Strong => "strong",
        }
    }

    /// Tuning profile for this level.
    pub fn profile(&self) -> LevelProfile {
        match self {
            CompressionLevel::Light => LevelProfile {
                jpeg_quality: 85,
                target_dpi: 150,
                max_dimension: 4096,
                objects_per_stream: 50,
                stream_compression: 6,
            },
            CompressionLevel::Medium => LevelProfile {
                jpeg_quality: 70,
                target_dpi: 120,
                max_dimension: 3072,
                objects_per_stream: 100,
                stream_compression: 7,
            },
            CompressionLevel::Strong => LevelProfile {
                jpeg_quality: 55,
                target_dpi: 96,
                max_dimension: 2048,
                objects_per_stream: 200,
                stream_compression: 9,
            },
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" | "low" => Ok(CompressionLevel::Light),
            "medium" | "balanced" => Ok(CompressionLevel::Medium),
            "strong" | "high" => Ok(CompressionLevel::Strong),
            _ => Err(DomainError::Validation(ValidationError::custom(&format!(
                "Invalid compression level: {}",
                s
            )))),
        }
    }
}

/// Per-level tuning values applied by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LevelProfile {
    /// JPEG quality target for raster content
    pub jpeg_quality: u8,
    /// DPI target for placed images
    pub target_dpi: u16,
    /// Longest allowed image edge in pixels
    pub max_dimension: u32,
    /// Objects batched per object stream when serializing
    pub objects_per_stream: usize,
    /// Deflate level for stream content
    pub stream_compression: u32,
}

/// Configuration for one compression run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOptions {
    pub level: CompressionLevel,
    pub remove_metadata: bool,
    pub optimize_images: bool,
    pub subset_fonts: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::Medium,
            remove_metadata: true,
            optimize_images: true,
            subset_fonts: true,
        }
    }
}

/// Pipeline stages, reported in this order on every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionStage {
    Loading,
    Analyzing,
    Compressing,
    Optimizing,
    Finalizing,
    Complete,
}

impl CompressionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionStage::Loading => "loading",
            CompressionStage::Analyzing => "analyzing",
            CompressionStage::Compressing => "compressing",
            CompressionStage::Optimizing => "optimizing",
            CompressionStage::Finalizing => "finalizing",
            CompressionStage::Complete => "complete",
        }
    }
}

/// One progress report from the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: CompressionStage,
    pub percent: u8,
    pub message: String,
}

/// Result of one compression run.
///
/// The engine never errors across its public boundary: failures are folded
/// into `success == false` with `compressed_size == original_size` and a
/// zero ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionResult {
    pub success: bool,
    pub compressed_pdf: Option<Vec<u8>>,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percent saved, clamped to `0..=100` (never negative, even when the
    /// serialized output grew)
    pub compression_ratio: u8,
    pub error: Option<String>,
}

impl CompressionResult {
    pub fn completed(original_size: u64, compressed: Vec<u8>) -> Self {
        let compressed_size = compressed.len() as u64;
        Self {
            success: true,
            compression_ratio: compression_ratio(original_size, compressed_size),
            compressed_pdf: Some(compressed),
            original_size,
            compressed_size,
            error: None,
        }
    }

    pub fn failed(original_size: u64, error: String) -> Self {
        Self {
            success: false,
            compressed_pdf: None,
            original_size,
            compressed_size: original_size,
            compression_ratio: 0,
            error: Some(error),
        }
    }
}

/// Percent saved, rounded, clamped so a grown output reports 0 rather than
/// a negative ratio.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> u8 {
    if original_size == 0 {
        return 0;
    }
    let saved = original_size.saturating_sub(compressed_size) as f64;
    ((saved / original_size as f64) * 100.0).round() as u8
}
