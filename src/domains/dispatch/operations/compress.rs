//! Compress job: run the in-process engine over a file on disk.

use std::path::Path;

use super::persist_output;
use crate::domains::compression::engine;
use crate::domains::compression::types::{CompressionLevel, CompressionOptions, StageProgress};
use crate::domains::dispatch::types::{CompressOutput, JobOutput};
use crate::errors::{DomainError, DomainResult};

/// Output at or above this share of the input is logged as ineffective.
const INEFFECTIVE_THRESHOLD_PERCENT: u64 = 95;

pub async fn run(
    input: &Path,
    quality: CompressionLevel,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> DomainResult<JobOutput> {
    let data = tokio::fs::read(input)
        .await
        .map_err(|e| DomainError::File(format!("Failed to read {}: {}", input.display(), e)))?;
    let original_size = data.len() as u64;

    let options = CompressionOptions {
        level: quality,
        ..Default::default()
    };

    // The engine's staged percentages map directly onto job progress.
    let sink = |p: StageProgress| progress(p.percent);
    let result = engine::compress(data, &options, Some(&sink)).await;

    if !result.success {
        return Err(DomainError::Compression(
            result
                .error
                .unwrap_or_else(|| "compression failed".to_string()),
        ));
    }

    let bytes = result
        .compressed_pdf
        .ok_or_else(|| DomainError::Internal("successful result missing output".to_string()))?;

    if result.compressed_size * 100 >= original_size.max(1) * INEFFECTIVE_THRESHOLD_PERCENT {
        log::info!(
            "compression ineffective for {}: {} -> {} bytes",
            input.display(),
            original_size,
            result.compressed_size
        );
    }

    let output_path = persist_output(&bytes, "compressed", "pdf")?;

    Ok(JobOutput::Compress(CompressOutput {
        output_path,
        original_size,
        compressed_size: result.compressed_size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};
    use std::io::Write;

    fn write_fixture_pdf() -> tempfile::NamedTempFile {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![Object::Reference(page_id)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&buffer).unwrap();
        file
    }

    #[tokio::test]
    async fn compresses_a_file_on_disk() {
        let fixture = write_fixture_pdf();
        let out = run(fixture.path(), CompressionLevel::Medium, &|_| {})
            .await
            .unwrap();

        match out {
            JobOutput::Compress(out) => {
                assert!(out.output_path.exists());
                assert!(out.original_size > 0);
                assert_eq!(
                    out.compressed_size,
                    std::fs::metadata(&out.output_path).unwrap().len()
                );
                std::fs::remove_file(&out.output_path).unwrap();
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_input_is_a_file_error() {
        let err = run(
            Path::new("/nonexistent/input.pdf"),
            CompressionLevel::Light,
            &|_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DomainError::File(_)));
    }
}
