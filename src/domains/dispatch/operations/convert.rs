//! Conversion jobs between rasters and PDF.
//!
//! `images_to_pdf` re-encodes each raster as a DCTDecode XObject drawn on
//! its own page. `pdf_to_images` goes the other way by extracting embedded
//! image XObjects; page rendering is a collaborator concern, so pages whose
//! content is not image-backed yield nothing here.

use image::{DynamicImage, GenericImageView, ImageEncoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tokio::task;

use super::persist_output;
use crate::domains::compression::images::{
    collect_page_images, decode_image_stream, encode_jpeg_xobject, image_stream_info,
};
use crate::domains::dispatch::types::{ConvertOutput, JobOutput, PageAssembly, RasterFormat};
use crate::errors::{DomainError, DomainResult, ValidationError};

/// JPEG quality for pages assembled from rasters.
const ASSEMBLY_JPEG_QUALITY: u8 = 85;

pub async fn images_to_pdf(
    inputs: Vec<PathBuf>,
    mode: PageAssembly,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> DomainResult<JobOutput> {
    if inputs.is_empty() {
        return Err(DomainError::Validation(ValidationError::custom(
            "No images to convert",
        )));
    }

    let total = inputs.len();
    let mut images = Vec::with_capacity(total);
    for (index, path) in inputs.iter().enumerate() {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::File(format!("Failed to read {}: {}", path.display(), e)))?;
        let display = path.display().to_string();
        let img = task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?
            .map_err(|e| DomainError::Conversion(format!("Failed to decode {}: {}", display, e)))?;
        images.push(img);
        progress(((index + 1) * 50 / total) as u8);
    }

    let mut output_paths = Vec::new();
    match mode {
        PageAssembly::Combined => {
            let pdf = task::spawn_blocking(move || build_pdf(&images))
                .await
                .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
            output_paths.push(persist_output(&pdf, "converted", "pdf")?);
            progress(100);
        }
        PageAssembly::Individual => {
            let count = images.len();
            for (index, img) in images.into_iter().enumerate() {
                let pdf = task::spawn_blocking(move || build_pdf(&[img]))
                    .await
                    .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
                output_paths.push(persist_output(&pdf, "converted", "pdf")?);
                progress((50 + (index + 1) * 50 / count) as u8);
            }
        }
    }

    Ok(JobOutput::Convert(ConvertOutput { output_paths }))
}

pub async fn pdf_to_images(
    input: &Path,
    format: RasterFormat,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> DomainResult<JobOutput> {
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| DomainError::File(format!("Failed to read {}: {}", input.display(), e)))?;
    progress(10);

    let rasters = task::spawn_blocking(move || extract_page_rasters(&bytes, format))
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
    progress(80);

    if rasters.is_empty() {
        return Err(DomainError::Conversion(
            "No extractable images found in document".to_string(),
        ));
    }

    let total = rasters.len();
    let mut output_paths = Vec::with_capacity(total);
    for (index, raster) in rasters.iter().enumerate() {
        output_paths.push(persist_output(raster, "page", format.extension())?);
        progress((80 + (index + 1) * 20 / total) as u8);
    }

    Ok(JobOutput::Convert(ConvertOutput { output_paths }))
}

/// One page per image, each drawn at its pixel size in PDF units.
fn build_pdf(images: &[DynamicImage]) -> DomainResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for img in images {
        let (width, height) = img.dimensions();
        let xobject_id = doc.add_object(encode_jpeg_xobject(img, ASSEMBLY_JPEG_QUALITY)?);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        (i64::from(width)).into(),
                        0.into(),
                        0.into(),
                        (i64::from(height)).into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| DomainError::Pdf(format!("Failed to encode content stream: {}", e)))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (i64::from(width)).into(),
                (i64::from(height)).into(),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => Object::Reference(xobject_id),
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| DomainError::Pdf(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}

/// Decode every extractable image XObject, page by page, into `format`.
fn extract_page_rasters(bytes: &[u8], format: RasterFormat) -> DomainResult<Vec<Vec<u8>>> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| DomainError::Pdf(format!("Failed to load PDF: {}", e)))?;

    let mut rasters = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let image_ids = collect_page_images(&doc, page_id);
        if image_ids.is_empty() {
            log::debug!("page {} has no image XObjects", page_num);
            continue;
        }

        for object_id in image_ids {
            let stream = match doc.get_object(object_id) {
                Ok(Object::Stream(s)) => s,
                _ => continue,
            };
            let info = image_stream_info(object_id, stream);
            match decode_image_stream(stream, &info) {
                Ok(img) => rasters.push(encode_raster(&img, format)?),
                Err(e) => {
                    log::debug!(
                        "skipping image {:?} on page {}: {}",
                        object_id,
                        page_num,
                        e
                    );
                }
            }
        }
    }

    Ok(rasters)
}

fn encode_raster(img: &DynamicImage, format: RasterFormat) -> DomainResult<Vec<u8>> {
    let mut output = Vec::new();
    match format {
        RasterFormat::Jpeg => {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut output,
                ASSEMBLY_JPEG_QUALITY,
            );
            encoder
                .encode_image(img)
                .map_err(|e| DomainError::Conversion(format!("JPEG encoding error: {}", e)))?;
        }
        RasterFormat::Png => {
            encode_png(img, &mut output)?;
        }
        RasterFormat::Webp => {
            #[cfg(feature = "webp")]
            {
                let encoder = webp::Encoder::from_image(img)
                    .map_err(|e| DomainError::Conversion(format!("WebP encoding error: {}", e)))?;
                output = encoder.encode(f32::from(ASSEMBLY_JPEG_QUALITY)).to_vec();
            }
            #[cfg(not(feature = "webp"))]
            {
                // Fall back to PNG
                encode_png(img, &mut output)?;
            }
        }
    }
    Ok(output)
}

fn encode_png(img: &DynamicImage, output: &mut Vec<u8>) -> DomainResult<()> {
    let png = img.to_rgba8();
    let encoder = image::codecs::png::PngEncoder::new_with_quality(
        output,
        image::codecs::png::CompressionType::Best,
        image::codecs::png::FilterType::Adaptive,
    );
    encoder
        .write_image(&png, png.width(), png.height(), image::ColorType::Rgba8)
        .map_err(|e| DomainError::Conversion(format!("PNG encoding error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Write;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 120])
        }));
        let mut bytes = Vec::new();
        encode_png(&img, &mut bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn combined_mode_builds_one_document() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(&png_fixture(40, 30)).unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(&png_fixture(20, 20)).unwrap();

        let out = images_to_pdf(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            PageAssembly::Combined,
            &|_| {},
        )
        .await
        .unwrap();

        match out {
            JobOutput::Convert(out) => {
                assert_eq!(out.output_paths.len(), 1);
                let doc = Document::load_mem(&std::fs::read(&out.output_paths[0]).unwrap()).unwrap();
                assert_eq!(doc.get_pages().len(), 2);
                std::fs::remove_file(&out.output_paths[0]).unwrap();
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn individual_mode_builds_one_document_per_image() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(&png_fixture(16, 16)).unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(&png_fixture(24, 24)).unwrap();

        let out = images_to_pdf(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            PageAssembly::Individual,
            &|_| {},
        )
        .await
        .unwrap();

        match out {
            JobOutput::Convert(out) => {
                assert_eq!(out.output_paths.len(), 2);
                for path in &out.output_paths {
                    let doc = Document::load_mem(&std::fs::read(path).unwrap()).unwrap();
                    assert_eq!(doc.get_pages().len(), 1);
                }
                for path in out.output_paths {
                    std::fs::remove_file(path).unwrap();
                }
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn round_trip_pdf_back_to_images() {
        // Assemble a PDF from rasters, then pull the rasters back out.
        let mut fixture = tempfile::NamedTempFile::new().unwrap();
        fixture.write_all(&png_fixture(32, 32)).unwrap();

        let assembled = images_to_pdf(
            vec![fixture.path().to_path_buf()],
            PageAssembly::Combined,
            &|_| {},
        )
        .await
        .unwrap();
        let pdf_path = match assembled {
            JobOutput::Convert(out) => out.output_paths.into_iter().next().unwrap(),
            other => panic!("unexpected output: {:?}", other),
        };

        let out = pdf_to_images(&pdf_path, RasterFormat::Png, &|_| {})
            .await
            .unwrap();
        match out {
            JobOutput::Convert(out) => {
                assert_eq!(out.output_paths.len(), 1);
                let raster = image::load_from_memory(
                    &std::fs::read(&out.output_paths[0]).unwrap(),
                )
                .unwrap();
                assert_eq!(raster.dimensions(), (32, 32));
                for path in out.output_paths {
                    std::fs::remove_file(path).unwrap();
                }
            }
            other => panic!("unexpected output: {:?}", other),
        }
        std::fs::remove_file(pdf_path).unwrap();
    }

    #[tokio::test]
    async fn text_only_pdf_yields_conversion_error() {
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
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let err = pdf_to_images(file.path(), RasterFormat::Png, &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conversion(_)));
    }

    #[tokio::test]
    async fn empty_image_list_is_rejected() {
        let err = images_to_pdf(vec![], PageAssembly::Combined, &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
