//! Document analysis feeding the method selector.
//!
//! `analyze` never fails: when the buffer cannot be parsed as a PDF the
//! classification degrades to a size-only heuristic instead of erroring.

use lopdf::Document;

use super::types::{
    Complexity, FileAnalysis, IMAGE_HEAVY_BYTES_PER_PAGE, TEXT_HEAVY_BYTES_PER_PAGE,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Classify a document buffer by page count, size and page weight.
pub fn analyze(data: &[u8]) -> FileAnalysis {
    let size_bytes = data.len() as u64;
    let size_mb = size_bytes as f64 / BYTES_PER_MB;

    match parsed_page_count(data) {
        Some(pages) => {
            let bytes_per_page = size_bytes / u64::from(pages);
            let is_image_heavy = bytes_per_page > IMAGE_HEAVY_BYTES_PER_PAGE;
            let is_text_heavy = bytes_per_page < TEXT_HEAVY_BYTES_PER_PAGE;

            let complexity = if is_image_heavy {
                Complexity::High
            } else if !is_text_heavy {
                Complexity::Medium
            } else {
                Complexity::Low
            };

            FileAnalysis {
                pages,
                size_mb,
                is_image_heavy,
                is_text_heavy,
                complexity,
            }
        }
        None => fallback_analysis(size_mb),
    }
}

/// Page count from a real parse, or `None` when the buffer is not a readable PDF.
fn parsed_page_count(data: &[u8]) -> Option<u32> {
    let looks_like_pdf = infer::get(data)
        .map(|kind| kind.mime_type() == "application/pdf")
        .unwrap_or(false);
    if !looks_like_pdf {
        log::debug!("buffer does not sniff as a PDF, using size-only analysis");
        return None;
    }

    let doc = match Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            log::debug!("PDF parse failed ({}), using size-only analysis", e);
            return None;
        }
    };

    let pages = doc.get_pages().len() as u32;
    if pages == 0 {
        return None;
    }
    Some(pages)
}

/// Size-only classification used when the document cannot be parsed.
fn fallback_analysis(size_mb: f64) -> FileAnalysis {
    let pages = (size_mb * 10.0).ceil().max(1.0) as u32;

    let complexity = if size_mb > 20.0 {
        Complexity::High
    } else if size_mb > 5.0 {
        Complexity::Medium
    } else {
        Complexity::Low
    };

    FileAnalysis {
        pages,
        size_mb,
        is_image_heavy: size_mb > 10.0,
        is_text_heavy: size_mb < 5.0,
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};

    fn pdf_with_pages(num_pages: u32) -> Vec<u8> {
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
    fn parses_real_page_count() {
        let pdf = pdf_with_pages(7);
        let analysis = analyze(&pdf);
        assert_eq!(analysis.pages, 7);
        // Tiny fixture: well under 50KB/page
        assert!(analysis.is_text_heavy);
        assert!(!analysis.is_image_heavy);
        assert_eq!(analysis.complexity, Complexity::Low);
    }

    #[test]
    fn garbage_falls_back_to_size_heuristic() {
        let data = vec![0xABu8; 3 * 1024 * 1024]; // 3 MB of noise
        let analysis = analyze(&data);
        assert_eq!(analysis.pages, 30); // ceil(3.0 * 10)
        assert!(analysis.is_text_heavy); // < 5 MB
        assert!(!analysis.is_image_heavy);
        assert_eq!(analysis.complexity, Complexity::Low);
    }

    #[test]
    fn fallback_tiers_follow_size() {
        let medium = fallback_analysis(8.0);
        assert_eq!(medium.complexity, Complexity::Medium);
        assert!(!medium.is_image_heavy);
        assert!(!medium.is_text_heavy);

        let large = fallback_analysis(25.0);
        assert_eq!(large.complexity, Complexity::High);
        assert!(large.is_image_heavy);
    }

    #[test]
    fn empty_buffer_still_classifies() {
        let analysis = analyze(&[]);
        assert_eq!(analysis.pages, 1);
        assert!(analysis.is_text_heavy);
        assert_eq!(analysis.complexity, Complexity::Low);
    }

    #[test]
    fn corrupt_pdf_header_falls_back() {
        // Valid magic, broken body
        let mut data = b"%PDF-1.7\n".to_vec();
        data.extend_from_slice(&[0u8; 2048]);
        let analysis = analyze(&data);
        assert_eq!(analysis.pages, 1);
    }
}
