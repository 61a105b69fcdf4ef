//! Job bodies executed by the pool's workers.

pub mod compress;
pub mod convert;
pub mod merge;
pub mod split;

use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;

use super::types::{JobOutput, JobRequest};
use crate::errors::{DomainError, DomainResult};

/// Seam between the pool and the operation bodies. Workers go through this
/// trait so embedders and tests can substitute the execution backend.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        request: JobRequest,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> DomainResult<JobOutput>;
}

/// Production runner backed by the real operation implementations.
#[derive(Debug, Default)]
pub struct OperationRunner;

#[async_trait]
impl JobRunner for OperationRunner {
    async fn run(
        &self,
        request: JobRequest,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> DomainResult<JobOutput> {
        match request {
            JobRequest::Compress { input, quality } => {
                compress::run(&input, quality, progress).await
            }
            JobRequest::Merge { inputs } => merge::run(inputs, progress).await,
            JobRequest::Split { input, ranges } => split::run(&input, ranges, progress).await,
            JobRequest::ImagesToPdf { inputs, mode } => {
                convert::images_to_pdf(inputs, mode, progress).await
            }
            JobRequest::PdfToImages { input, format } => {
                convert::pdf_to_images(&input, format, progress).await
            }
        }
    }
}

/// Write job output to a path the job owns. The file survives the temp
/// handle so the caller can move or serve it.
pub(crate) fn persist_output(bytes: &[u8], label: &str, ext: &str) -> DomainResult<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("morph-{}-", label))
        .suffix(&format!(".{}", ext))
        .tempfile()
        .map_err(|e| DomainError::File(format!("Failed to create output file: {}", e)))?;

    file.write_all(bytes)
        .map_err(|e| DomainError::File(format!("Failed to write output file: {}", e)))?;

    let (_, path) = file
        .keep()
        .map_err(|e| DomainError::File(format!("Failed to persist output file: {}", e)))?;
    Ok(path)
}
