//! Type definitions for the worker dispatch domain.
//!
//! Job requests and outputs are tagged unions with one variant per
//! operation, mirroring the typed request/response shapes carried over the
//! pool's message channels.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domains::compression::types::CompressionLevel;
use crate::errors::{DomainError, ValidationError};

/// Progress callback for a dispatched job, invoked with `0..=100`.
pub type ProgressHandler = Box<dyn Fn(u8) + Send + Sync>;

/// Default concurrency bound for the pool.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default wall-clock limit per job.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Pool construction parameters. `job_timeout` is injectable so tests can
/// shorten the five-minute production default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_workers: usize,
    #[serde(with = "duration_secs")]
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A 1-indexed inclusive page range, e.g. `2-5` or a single page `7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Pages covered by this range, in order.
    pub fn pages(&self) -> Vec<u32> {
        (self.start..=self.end).collect()
    }

    pub fn validate(&self, page_count: u32) -> Result<(), ValidationError> {
        if self.start == 0 {
            return Err(ValidationError::invalid_value(
                "range",
                "page numbers are 1-indexed",
            ));
        }
        if self.start > self.end {
            return Err(ValidationError::invalid_value(
                "range",
                &format!("{}-{} is inverted", self.start, self.end),
            ));
        }
        if self.end > page_count {
            return Err(ValidationError::range(
                "range",
                1u32.to_string(),
                page_count.to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for PageRange {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|_| {
                DomainError::Validation(ValidationError::invalid_value(
                    "range",
                    &format!("'{}' is not a page number", part),
                ))
            })
        };
        match s.split_once('-') {
            Some((start, end)) => Ok(Self::new(parse(start)?, parse(end)?)),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

/// How images are assembled into PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageAssembly {
    /// All images become pages of one document
    Combined,

    /// One single-page document per image
    Individual,
}

impl FromStr for PageAssembly {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "combined" | "single" => Ok(PageAssembly::Combined),
            "individual" | "multiple" => Ok(PageAssembly::Individual),
            _ => Err(DomainError::Validation(ValidationError::custom(&format!(
                "Invalid page assembly mode: {}",
                s
            )))),
        }
    }
}

/// Output raster format for extracted page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterFormat {
    Png,
    Jpeg,
    Webp,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Webp => "webp",
        }
    }
}

impl FromStr for RasterFormat {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(RasterFormat::Png),
            "jpg" | "jpeg" => Ok(RasterFormat::Jpeg),
            "webp" => Ok(RasterFormat::Webp),
            _ => Err(DomainError::Validation(ValidationError::custom(&format!(
                "Invalid raster format: {}",
                s
            )))),
        }
    }
}

/// One dispatchable job. One variant per operation; each carries only the
/// fields that operation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobRequest {
    Compress {
        input: PathBuf,
        quality: CompressionLevel,
    },
    Merge {
        inputs: Vec<PathBuf>,
    },
    Split {
        input: PathBuf,
        ranges: Vec<PageRange>,
    },
    ImagesToPdf {
        inputs: Vec<PathBuf>,
        mode: PageAssembly,
    },
    PdfToImages {
        input: PathBuf,
        format: RasterFormat,
    },
}

impl JobRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::Compress { .. } => "compress",
            JobRequest::Merge { .. } => "merge",
            JobRequest::Split { .. } => "split",
            JobRequest::ImagesToPdf { .. } => "images-to-pdf",
            JobRequest::PdfToImages { .. } => "pdf-to-images",
        }
    }
}

/// Result payload of a compress job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressOutput {
    pub output_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Result payload of a merge job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutput {
    pub output_path: PathBuf,
}

/// Result payload of a split job: one document per requested range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutput {
    pub output_paths: Vec<PathBuf>,
}

/// Result payload of a conversion job in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOutput {
    pub output_paths: Vec<PathBuf>,
}

/// Completion payload of any job, tagged to match its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobOutput {
    Compress(CompressOutput),
    Merge(MergeOutput),
    Split(SplitOutput),
    Convert(ConvertOutput),
}

/// Live pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub active_jobs: usize,
    pub queued_jobs: usize,
    pub max_workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_parses_both_shapes() {
        assert_eq!("3".parse::<PageRange>().unwrap(), PageRange::single(3));
        assert_eq!("2-5".parse::<PageRange>().unwrap(), PageRange::new(2, 5));
        assert_eq!(" 1 - 4 ".parse::<PageRange>().unwrap(), PageRange::new(1, 4));
        assert!("a-b".parse::<PageRange>().is_err());
    }

    #[test]
    fn page_range_validation() {
        assert!(PageRange::new(1, 3).validate(5).is_ok());
        assert!(PageRange::new(0, 3).validate(5).is_err());
        assert!(PageRange::new(4, 2).validate(5).is_err());
        assert!(PageRange::new(2, 9).validate(5).is_err());
    }

    #[test]
    fn request_kinds_match_wire_names() {
        let req = JobRequest::PdfToImages {
            input: PathBuf::from("in.pdf"),
            format: RasterFormat::Png,
        };
        assert_eq!(req.kind(), "pdf-to-images");
    }

    #[test]
    fn request_serializes_as_tagged_variant() {
        let req = JobRequest::Split {
            input: PathBuf::from("in.pdf"),
            ranges: vec![PageRange::new(1, 2)],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("Split"));
        let back: JobRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "split");
    }
}
