//! Merge job: combine multiple PDFs into one document.
//!
//! Object ids of each appended document are shifted past the destination's
//! current maximum so references stay unambiguous, then the page tree is
//! rebuilt over the combined page list.

use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::task;

use super::persist_output;
use crate::domains::dispatch::types::{JobOutput, MergeOutput};
use crate::errors::{DomainError, DomainResult, ValidationError};

pub async fn run(
    inputs: Vec<PathBuf>,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> DomainResult<JobOutput> {
    if inputs.is_empty() {
        return Err(DomainError::Validation(ValidationError::custom(
            "No documents to merge",
        )));
    }

    let total = inputs.len();
    let mut documents = Vec::with_capacity(total);
    for (index, path) in inputs.iter().enumerate() {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::File(format!("Failed to read {}: {}", path.display(), e)))?;
        documents.push(bytes);
        progress(((index + 1) * 30 / total) as u8);
    }

    let merged = task::spawn_blocking(move || merge_documents(documents))
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
    progress(90);

    let output_path = persist_output(&merged, "merged", "pdf")?;
    progress(100);

    Ok(JobOutput::Merge(MergeOutput { output_path }))
}

/// Merge loaded document buffers in order. A single document passes through
/// untouched.
fn merge_documents(documents: Vec<Vec<u8>>) -> DomainResult<Vec<u8>> {
    if documents.is_empty() {
        return Err(DomainError::Validation(ValidationError::custom(
            "No documents to merge",
        )));
    }
    if documents.len() == 1 {
        return Ok(documents.into_iter().next().unwrap_or_default());
    }

    let mut loaded = Vec::with_capacity(documents.len());
    for (index, bytes) in documents.iter().enumerate() {
        let doc = Document::load_mem(bytes).map_err(|e| {
            DomainError::Pdf(format!("Failed to load document {}: {}", index + 1, e))
        })?;
        loaded.push(doc);
    }

    let mut dest = loaded.remove(0);
    let mut dest_max_id = dest.max_id;
    let mut page_refs: Vec<ObjectId> = dest.get_pages().values().copied().collect();

    for source in loaded {
        let source_pages: Vec<ObjectId> = source.get_pages().values().copied().collect();
        let offset = dest_max_id;

        let mut shifted = BTreeMap::new();
        for (old_id, object) in source.objects.into_iter() {
            shifted.insert((old_id.0 + offset, old_id.1), shift_references(object, offset));
        }
        dest.objects.extend(shifted);

        page_refs.extend(
            source_pages
                .into_iter()
                .map(|id| (id.0 + offset, id.1)),
        );
        dest_max_id = (source.max_id + offset).max(dest_max_id);
    }

    rebuild_page_tree(&mut dest, page_refs)?;
    dest.max_id = dest_max_id;
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| DomainError::Pdf(format!("Failed to save merged PDF: {}", e)))?;
    Ok(buffer)
}

/// Recursively shift every object reference by `offset`.
fn shift_references(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| shift_references(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = shift_references(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = shift_references(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the destination's page tree at the combined page list.
fn rebuild_page_tree(doc: &mut Document, page_refs: Vec<ObjectId>) -> DomainResult<()> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .ok_or_else(|| DomainError::Pdf("No catalog reference in trailer".to_string()))?;

    let pages_id = doc
        .objects
        .get(&catalog_id)
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|catalog| catalog.get(b"Pages").ok())
        .and_then(|obj| obj.as_reference().ok())
        .ok_or_else(|| DomainError::Pdf("Catalog has no Pages reference".to_string()))?;

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages)) => {
            pages.set(
                "Kids",
                Object::Array(page_refs.iter().map(|&id| Object::Reference(id)).collect()),
            );
            pages.set("Count", Object::Integer(page_refs.len() as i64));
            Ok(())
        }
        _ => Err(DomainError::Pdf("Pages object is not a dictionary".to_string())),
    }
}
