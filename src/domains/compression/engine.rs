//! In-process PDF compression pipeline.
//!
//! Runs entirely inside the caller's task: load, strip metadata, walk pages,
//! compact streams, serialize with level-scaled save options. The public
//! `compress` function is total — every failure folds into a
//! `CompressionResult` with `success == false`.

use lopdf::{Document, Object, ObjectId, SaveOptions};
use std::env;
use thiserror::Error;
use tokio::task;

use super::images::{collect_page_images, image_stream_info};
use super::types::{
    CompressionOptions, CompressionResult, CompressionStage, LevelProfile, StageProgress,
};
use crate::errors::{DomainError, DomainResult, ValidationError};

/// Progress sink invoked once per pipeline stage transition.
pub type ProgressFn<'a> = &'a (dyn Fn(StageProgress) + Send + Sync);

// Maximum buffer size we are willing to mutate in memory.
// Default: 2GB, can be overridden by env var `MORPH_MAX_IN_MEMORY_BYTES`.
fn max_in_memory_bytes() -> u64 {
    env::var("MORPH_MAX_IN_MEMORY_BYTES")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(2048 * 1024 * 1024)
}

/// Non-fatal outcome of the best-effort metadata pass.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MetadataWarning(String);

/// Compress a PDF buffer with the given options.
///
/// Never returns an error and never panics across this boundary; on failure
/// the result carries the message and mirrors the original size.
pub async fn compress(
    data: Vec<u8>,
    options: &CompressionOptions,
    on_progress: Option<ProgressFn<'_>>,
) -> CompressionResult {
    let original_size = data.len() as u64;

    match run_pipeline(data, options, on_progress).await {
        Ok(bytes) => {
            let result = CompressionResult::completed(original_size, bytes);
            log::info!(
                "compressed {} -> {} bytes ({}% saved, level {})",
                result.original_size,
                result.compressed_size,
                result.compression_ratio,
                options.level.as_str()
            );
            result
        }
        Err(e) => {
            log::error!("compression failed: {}", e);
            CompressionResult::failed(original_size, e.to_string())
        }
    }
}

async fn run_pipeline(
    data: Vec<u8>,
    options: &CompressionOptions,
    on_progress: Option<ProgressFn<'_>>,
) -> DomainResult<Vec<u8>> {
    emit(on_progress, CompressionStage::Loading, 10, "Loading document");

    if data.len() as u64 > max_in_memory_bytes() {
        return Err(DomainError::Validation(ValidationError::custom(
            "File is too large for in-memory compression",
        )));
    }

    let mut doc = task::spawn_blocking(move || Document::load_mem(&data))
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?
        .map_err(|e| DomainError::Pdf(format!("Failed to load PDF: {}", e)))?;

    emit(
        on_progress,
        CompressionStage::Analyzing,
        20,
        "Analyzing document structure",
    );

    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();

    if options.remove_metadata {
        if let Err(warning) = strip_metadata(&mut doc) {
            log::warn!("metadata removal incomplete: {}", warning);
        }
    }

    let profile = options.level.profile();
    let total_pages = page_ids.len().max(1);

    for (index, page_id) in page_ids.iter().enumerate() {
        if options.optimize_images {
            optimize_page(&doc, *page_id, &profile);
        }
        let percent = (30 + (index + 1) * 40 / total_pages).min(70) as u8;
        emit(
            on_progress,
            CompressionStage::Compressing,
            percent,
            &format!("Compressing page {}/{}", index + 1, total_pages),
        );
    }

    emit(
        on_progress,
        CompressionStage::Optimizing,
        75,
        "Compacting content streams",
    );

    let mut doc = task::spawn_blocking(move || {
        doc.compress();
        doc
    })
    .await
    .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?;

    emit(
        on_progress,
        CompressionStage::Finalizing,
        90,
        "Serializing document",
    );

    let bytes = task::spawn_blocking(move || -> DomainResult<Vec<u8>> {
        let save_options = SaveOptions::builder()
            .use_object_streams(true)
            .use_xref_streams(true)
            .max_objects_per_stream(profile.objects_per_stream)
            .compression_level(profile.stream_compression)
            .build();

        let mut buffer = Vec::new();
        doc.save_with_options(&mut buffer, save_options)
            .map_err(|e| DomainError::Pdf(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    })
    .await
    .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;

    emit(
        on_progress,
        CompressionStage::Complete,
        100,
        "Compression complete",
    );

    Ok(bytes)
}

/// Remove document-level metadata: the trailer `Info` dictionary and the
/// catalog's XMP `Metadata` stream reference.
///
/// Best-effort: a malformed catalog produces a warning, never a failure.
fn strip_metadata(doc: &mut Document) -> Result<(), MetadataWarning> {
    let removed_info = doc.trailer.remove(b"Info").is_some();
    if removed_info {
        log::debug!("removed trailer Info dictionary");
    }

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .ok_or_else(|| MetadataWarning("document has no catalog reference".to_string()))?;

    match doc.objects.get_mut(&catalog_id) {
        Some(Object::Dictionary(catalog)) => {
            if catalog.remove(b"Metadata").is_some() {
                log::debug!("removed catalog Metadata stream reference");
            }
            Ok(())
        }
        _ => Err(MetadataWarning(
            "catalog is not a dictionary, XMP metadata left in place".to_string(),
        )),
    }
}

/// Structural per-page pass sized by the level profile.
///
/// Inventories the page's image XObjects against the profile's dimension
/// target. Pixel re-encoding is deliberately not performed here; byte
/// savings come from stream compaction and the level-scaled save options.
fn optimize_page(doc: &Document, page_id: ObjectId, profile: &LevelProfile) {
    let image_ids = collect_page_images(doc, page_id);
    if image_ids.is_empty() {
        return;
    }

    let mut oversized = 0usize;
    let mut bytes = 0usize;
    for object_id in image_ids.iter() {
        if let Ok(Object::Stream(stream)) = doc.get_object(*object_id) {
            let info = image_stream_info(*object_id, stream);
            bytes += info.size_bytes;
            if info.width.max(info.height) > profile.max_dimension {
                oversized += 1;
            }
        }
    }

    if oversized > 0 {
        log::debug!(
            "page {:?}: {} of {} images exceed {}px ({} bytes total) at the {} dpi target",
            page_id,
            oversized,
            image_ids.len(),
            profile.max_dimension,
            bytes,
            profile.target_dpi
        );
    }
}

fn emit(on_progress: Option<ProgressFn<'_>>, stage: CompressionStage, percent: u8, message: &str) {
    log::debug!("stage {} at {}%", stage.as_str(), percent);
    if let Some(callback) = on_progress {
        callback(StageProgress {
            stage,
            percent,
            message: message.to_string(),
        });
    }
}
