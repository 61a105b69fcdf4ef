//! Image XObject helpers shared by the compression engine and the
//! conversion operations: locating images on a page, decoding their
//! streams into raster buffers, and encoding rasters back into PDF or
//! standalone formats.

use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Read;

use crate::errors::{DomainError, DomainResult};

/// Basic facts about one image XObject.
#[derive(Debug, Clone)]
pub struct ImageStreamInfo {
    pub object_id: ObjectId,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u32,
    pub size_bytes: usize,
}

/// Collect the image XObjects referenced by a page, following Form XObjects
/// one level of nesting at a time.
pub fn collect_page_images(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    let page_dict = match doc.get_object(page_id) {
        Ok(Object::Dictionary(d)) => d,
        _ => return images,
    };

    let xobjects = page_dict
        .get(b"Resources")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| resolve_dict(doc, obj));

    if let Some(xobjects) = xobjects {
        for (_, value) in xobjects.iter() {
            if let Object::Reference(id) = value {
                collect_images_recursive(doc, *id, &mut images, &mut seen);
            }
        }
    }

    images
}

fn collect_images_recursive(
    doc: &Document,
    obj_id: ObjectId,
    images: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
) {
    if !seen.insert(obj_id) {
        return;
    }

    let stream = match doc.get_object(obj_id) {
        Ok(Object::Stream(s)) => s,
        _ => return,
    };

    match name_of(stream.dict.get(b"Subtype").ok()).as_deref() {
        Some("Image") => images.push(obj_id),
        Some("Form") => {
            let nested = stream
                .dict
                .get(b"Resources")
                .ok()
                .and_then(|obj| resolve_dict(doc, obj))
                .and_then(|res| res.get(b"XObject").ok())
                .and_then(|obj| resolve_dict(doc, obj));
            if let Some(nested) = nested {
                for (_, value) in nested.iter() {
                    if let Object::Reference(id) = value {
                        collect_images_recursive(doc, *id, images, seen);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Read the dictionary facts of an image stream without touching its content.
pub fn image_stream_info(object_id: ObjectId, stream: &Stream) -> ImageStreamInfo {
    let dims = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0) as u32
    };

    let color_space = match stream.dict.get(b"ColorSpace").ok() {
        Some(Object::Name(n)) => String::from_utf8_lossy(n).to_string(),
        Some(Object::Array(arr)) => arr
            .first()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };

    ImageStreamInfo {
        object_id,
        width: dims(b"Width"),
        height: dims(b"Height"),
        color_space,
        bits_per_component: dims(b"BitsPerComponent"),
        size_bytes: stream.content.len(),
    }
}

/// Decode an image XObject stream into a raster buffer.
///
/// DCTDecode streams are JPEG and decode directly; FlateDecode streams are
/// inflated and interpreted by color space.
pub fn decode_image_stream(stream: &Stream, info: &ImageStreamInfo) -> DomainResult<DynamicImage> {
    let content = &stream.content;
    let filter = name_of(stream.dict.get(b"Filter").ok());

    let raw = match filter.as_deref() {
        Some("DCTDecode") => {
            return image::load_from_memory_with_format(content, ImageFormat::Jpeg)
                .map_err(|e| DomainError::Conversion(format!("Failed to decode JPEG image: {}", e)));
        }
        Some("JPXDecode") => {
            return image::load_from_memory(content)
                .map_err(|e| DomainError::Conversion(format!("Failed to decode JPEG2000 image: {}", e)));
        }
        Some("FlateDecode") => {
            let mut decoder = ZlibDecoder::new(&content[..]);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| DomainError::Conversion(format!("Failed to inflate image stream: {}", e)))?;
            decoded
        }
        None => content.clone(),
        Some(other) => {
            return Err(DomainError::Conversion(format!(
                "Unsupported image filter: {}",
                other
            )));
        }
    };

    if info.bits_per_component != 8 {
        return Err(DomainError::Conversion(format!(
            "Unsupported bit depth: {}",
            info.bits_per_component
        )));
    }

    let (width, height) = (info.width, info.height);
    let pixels = (width as usize) * (height as usize);

    match info.color_space.as_str() {
        "DeviceRGB" | "RGB" | "CalRGB" => {
            if raw.len() < pixels * 3 {
                return Err(DomainError::Conversion("Truncated RGB image data".to_string()));
            }
            RgbImage::from_raw(width, height, raw[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| DomainError::Conversion("Failed to build RGB image".to_string()))
        }
        "DeviceGray" | "Gray" | "CalGray" => {
            if raw.len() < pixels {
                return Err(DomainError::Conversion("Truncated grayscale image data".to_string()));
            }
            image::GrayImage::from_raw(width, height, raw[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| DomainError::Conversion("Failed to build grayscale image".to_string()))
        }
        "DeviceCMYK" | "CMYK" => {
            if raw.len() < pixels * 4 {
                return Err(DomainError::Conversion("Truncated CMYK image data".to_string()));
            }
            let mut rgb = Vec::with_capacity(pixels * 3);
            for chunk in raw[..pixels * 4].chunks(4) {
                let c = f32::from(chunk[0]) / 255.0;
                let m = f32::from(chunk[1]) / 255.0;
                let y = f32::from(chunk[2]) / 255.0;
                let k = f32::from(chunk[3]) / 255.0;
                rgb.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
            }
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| DomainError::Conversion("Failed to build RGB image from CMYK".to_string()))
        }
        "ICCBased" => {
            // Component count is unknown without the ICC stream; guess by size.
            if raw.len() >= pixels * 3 {
                RgbImage::from_raw(width, height, raw[..pixels * 3].to_vec())
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(|| DomainError::Conversion("Failed to build RGB image".to_string()))
            } else if raw.len() >= pixels {
                image::GrayImage::from_raw(width, height, raw[..pixels].to_vec())
                    .map(DynamicImage::ImageLuma8)
                    .ok_or_else(|| {
                        DomainError::Conversion("Failed to build grayscale image".to_string())
                    })
            } else {
                Err(DomainError::Conversion(
                    "Could not determine ICCBased component layout".to_string(),
                ))
            }
        }
        other => Err(DomainError::Conversion(format!(
            "Unsupported color space: {}",
            other
        ))),
    }
}

/// Encode a raster as a DCTDecode image XObject stream.
pub fn encode_jpeg_xobject(img: &DynamicImage, quality: u8) -> DomainResult<Stream> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder
        .encode(
            rgb.as_raw(),
            width as u16,
            height as u16,
            jpeg_encoder::ColorType::Rgb,
        )
        .map_err(|e| DomainError::Conversion(format!("Failed to encode JPEG: {}", e)))?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Length", Object::Integer(jpeg_bytes.len() as i64));

    Ok(Stream::new(dict, jpeg_bytes))
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    match obj {
        Some(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
        Some(Object::Array(arr)) => arr.first().and_then(|o| match o {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_xobject_round_trips_through_decoder() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            64,
            48,
            image::Rgb([180u8, 40, 90]),
        ));
        let stream = encode_jpeg_xobject(&img, 80).unwrap();
        let info = image_stream_info((1, 0), &stream);
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert_eq!(info.color_space, "DeviceRGB");

        let decoded = decode_image_stream(&stream, &info).unwrap();
        assert_eq!(decoded.to_rgb8().dimensions(), (64, 48));
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let mut dict = Dictionary::new();
        dict.set("Width", Object::Integer(2));
        dict.set("Height", Object::Integer(2));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        dict.set("Filter", Object::Name(b"CCITTFaxDecode".to_vec()));
        let stream = Stream::new(dict, vec![0u8; 12]);
        let info = image_stream_info((1, 0), &stream);
        assert!(decode_image_stream(&stream, &info).is_err());
    }

    #[test]
    fn raw_gray_stream_decodes() {
        let mut dict = Dictionary::new();
        dict.set("Width", Object::Integer(3));
        dict.set("Height", Object::Integer(2));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        let stream = Stream::new(dict, vec![10u8, 20, 30, 40, 50, 60]);
        let info = image_stream_info((1, 0), &stream);
        let img = decode_image_stream(&stream, &info).unwrap();
        assert_eq!(img.to_luma8().dimensions(), (3, 2));
    }
}
