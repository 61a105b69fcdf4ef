//! Split job: extract page ranges into separate documents.
//!
//! Each requested range becomes its own output. Extraction keeps the
//! whitelisted pages and deletes the rest, then prunes orphaned objects so
//! resources belonging only to removed pages do not leak into the output.

use lopdf::Document;
use std::collections::HashSet;
use std::path::Path;
use tokio::task;

use super::persist_output;
use crate::domains::dispatch::types::{JobOutput, PageRange, SplitOutput};
use crate::errors::{DomainError, DomainResult, ValidationError};

pub async fn run(
    input: &Path,
    ranges: Vec<PageRange>,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> DomainResult<JobOutput> {
    if ranges.is_empty() {
        return Err(DomainError::Validation(ValidationError::custom(
            "No page ranges specified",
        )));
    }

    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| DomainError::File(format!("Failed to read {}: {}", input.display(), e)))?;
    progress(10);

    let probe = bytes.clone();
    let page_count = task::spawn_blocking(move || {
        Document::load_mem(&probe).map(|doc| doc.get_pages().len() as u32)
    })
    .await
    .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?
    .map_err(|e| DomainError::Pdf(format!("Failed to load PDF: {}", e)))?;

    for range in &ranges {
        range.validate(page_count)?;
    }

    let total = ranges.len();
    let mut output_paths = Vec::with_capacity(total);
    for (index, range) in ranges.iter().enumerate() {
        let source = bytes.clone();
        let pages = range.pages();
        let extracted = task::spawn_blocking(move || extract_pages(&source, &pages))
            .await
            .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
        output_paths.push(persist_output(&extracted, "split", "pdf")?);
        progress((10 + (index + 1) * 85 / total) as u8);
    }
    progress(100);

    Ok(JobOutput::Split(SplitOutput { output_paths }))
}

/// Build a document containing only the whitelisted pages (1-indexed).
fn extract_pages(bytes: &[u8], pages: &[u32]) -> DomainResult<Vec<u8>> {
    let mut doc = Document::load_mem(bytes)
        .map_err(|e| DomainError::Pdf(format!("Failed to load PDF: {}", e)))?;
    let page_count = doc.get_pages().len() as u32;

    let keep: HashSet<u32> = pages.iter().copied().collect();
    let mut delete: Vec<u32> = (1..=page_count).filter(|p| !keep.contains(p)).collect();

    // Reverse order so earlier deletions do not shift pending indices.
    delete.reverse();
    for page in delete {
        doc.delete_pages(&[page]);
    }

    doc.prune_objects();
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| DomainError::Pdf(format!("Failed to save split PDF: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};
    use std::io::Write;

    fn test_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for _ in 0..num_pages {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => num_pages as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn extracts_a_single_page() {
        let pdf = test_pdf(5);
        let out = extract_pages(&pdf, &[2]).unwrap();
        assert_eq!(Document::load_mem(&out).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn extracts_a_contiguous_range() {
        let pdf = test_pdf(10);
        let out = extract_pages(&pdf, &[3, 4, 5, 6]).unwrap();
        assert_eq!(Document::load_mem(&out).unwrap().get_pages().len(), 4);
    }

    #[tokio::test]
    async fn empty_ranges_are_rejected() {
        let err = run(Path::new("unused.pdf"), vec![], &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&test_pdf(3)).unwrap();

        let err = run(file.path(), vec![PageRange::new(2, 9)], &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn produces_one_output_per_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&test_pdf(6)).unwrap();

        let out = run(
            file.path(),
            vec![PageRange::new(1, 2), PageRange::new(4, 6)],
            &|_| {},
        )
        .await
        .unwrap();

        match out {
            JobOutput::Split(out) => {
                assert_eq!(out.output_paths.len(), 2);
                let first =
                    Document::load_mem(&std::fs::read(&out.output_paths[0]).unwrap()).unwrap();
                assert_eq!(first.get_pages().len(), 2);
                let second =
                    Document::load_mem(&std::fs::read(&out.output_paths[1]).unwrap()).unwrap();
                assert_eq!(second.get_pages().len(), 3);
                for path in out.output_paths {
                    std::fs::remove_file(path).unwrap();
                }
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
