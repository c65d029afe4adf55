//! PDF loading, page analysis and embedded image extraction using lopdf.

use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, trace};

use super::fonts::{number, resolve};
use super::text_layer::{inherited, page_resources, TextLayer};
use super::{PdfType, Result};
use crate::error::PdfError;

/// A loaded PDF with page lookup helpers.
pub struct PdfExtractor {
    document: Document,
}

/// Embedded raster found on a page.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub image: DynamicImage,
    /// Name of the XObject resource.
    pub name: String,
}

impl PdfExtractor {
    /// Parse a PDF, decrypting documents protected only by an empty password.
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        Ok(Self { document: doc })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Object id of a 1-based page.
    pub fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Page size in points, from the (possibly inherited) MediaBox.
    pub fn page_size(&self, page: u32) -> Result<(f32, f32)> {
        let page_id = self.page_id(page)?;
        let media_box = inherited(&self.document, page_id, b"MediaBox")
            .and_then(|o| resolve(&self.document, o).as_array().ok())
            .map(|a| a.iter().filter_map(number).collect::<Vec<_>>())
            .filter(|v| v.len() == 4);

        Ok(match media_box {
            Some(v) => ((v[2] - v[0]).abs(), (v[3] - v[1]).abs()),
            // US Letter, the reader default
            None => (612.0, 792.0),
        })
    }

    /// Classify the document by whether its pages carry text, images, or both.
    pub fn analyze(&self) -> PdfType {
        let mut has_text = false;
        let mut has_images = false;

        for page in 1..=self.page_count() {
            if !has_text {
                has_text = TextLayer::from_page(&self.document, page)
                    .map(|layer| layer.has_text())
                    .unwrap_or(false);
            }
            if !has_images {
                has_images = self
                    .image_xobjects(page)
                    .map(|ids| !ids.is_empty())
                    .unwrap_or(false);
            }
            if has_text && has_images {
                break;
            }
        }

        let pdf_type = match (has_text, has_images) {
            (true, false) => PdfType::Text,
            (false, true) => PdfType::Image,
            (true, true) => PdfType::Hybrid,
            (false, false) => PdfType::Empty,
        };

        debug!("PDF analysis: has_text={}, has_images={} -> {:?}", has_text, has_images, pdf_type);
        pdf_type
    }

    fn image_xobjects(&self, page: u32) -> Result<Vec<(String, ObjectId)>> {
        let doc = &self.document;
        let page_id = self.page_id(page)?;

        let mut found = Vec::new();
        let Some(resources) = page_resources(doc, page_id) else {
            return Ok(found);
        };
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
        else {
            return Ok(found);
        };

        for (name, obj) in xobjects.iter() {
            let Object::Reference(id) = obj else { continue };
            if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    == Some(b"Image".as_slice());
                if is_image {
                    found.push((String::from_utf8_lossy(name).to_string(), *id));
                }
            }
        }
        Ok(found)
    }

    /// Decode the image XObjects a page references, largest first.
    pub fn extract_images(&self, page: u32) -> Result<Vec<ExtractedImage>> {
        let mut images = Vec::new();
        for (name, id) in self.image_xobjects(page)? {
            match self.document.get_object(id) {
                Ok(obj) => match self.decode_image(obj) {
                    Some(image) => images.push(ExtractedImage { image, name }),
                    None => trace!("Skipping undecodable image {} on page {}", name, page),
                },
                Err(e) => trace!("Missing image object {}: {}", name, e),
            }
        }

        images.sort_by_key(|img| std::cmp::Reverse(img.image.width() as u64 * img.image.height() as u64));
        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }

    fn decode_image(&self, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        let width = dict.get(b"Width").ok().and_then(number)? as u32;
        let height = dict.get(b"Height").ok().and_then(number)? as u32;
        trace!("Found image object: {}x{}", width, height);

        let filter = dict.get(b"Filter").ok().and_then(|f| match f {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
            _ => None,
        });

        match filter {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter {:?}", filter.map(String::from_utf8_lossy));
                return None;
            }
            _ => {}
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .map(|o| resolve(&self.document, o))
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict.get(b"BitsPerComponent").ok().and_then(number).unwrap_or(8.0) as u8;
        raw_image(&data, width, height, color_space, bits)
    }
}

fn raw_image(data: &[u8], width: u32, height: u32, color_space: &[u8], bits: u8) -> Option<DynamicImage> {
    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    let pixels = width as usize * height as usize;
    match color_space {
        b"DeviceRGB" | b"RGB" | b"CalRGB" if data.len() >= pixels * 3 => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data[..pixels * 3].to_vec())
                .map(DynamicImage::ImageRgb8)
        }
        b"DeviceGray" | b"G" | b"CalGray" if data.len() >= pixels => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data[..pixels].to_vec())
                .map(DynamicImage::ImageLuma8)
        }
        _ => {
            trace!(
                "Could not decode image: colorspace={}, data_len={}, pixels={}",
                String::from_utf8_lossy(color_space),
                data.len(),
                pixels
            );
            None
        }
    }
}
