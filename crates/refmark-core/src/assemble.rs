//! Reassembly of page bitmaps into one PDF, with scratch storage for the pages.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{PdfError, RefmarkError, ScratchError};

const JPEG_QUALITY: u8 = 90;

/// Builds an image-only PDF one page at a time.
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    dpi: u32,
}

impl PdfAssembler {
    pub fn new(dpi: u32) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            dpi: dpi.max(1),
        }
    }

    /// Append a page sized so the image keeps its resolution at the assembler's DPI.
    pub fn add_page(&mut self, image: &DynamicImage) -> crate::Result<()> {
        let (width, height) = image.dimensions();
        let mut jpeg = Vec::new();
        image
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut Cursor::new(&mut jpeg), JPEG_QUALITY))?;

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let scale = 72.0 / self.dpi as f32;
        let (page_w, page_h) = (width as f32 * scale, height as f32 * scale);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page_w),
                        0.into(),
                        0.into(),
                        Object::Real(page_h),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|e| PdfError::Save(e.to_string()))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w), Object::Real(page_h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Write the document; fails if no page was added.
    pub fn finish(mut self) -> crate::Result<Vec<u8>> {
        if self.kids.is_empty() {
            return Err(PdfError::NoPages.into());
        }

        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        debug!("Assembled {} page(s), {} bytes", count, out.len());
        Ok(out)
    }
}

/// One PDF with a page per image, in order. Pages are consumed one at a time.
pub fn images_to_pdf<I>(pages: I, dpi: u32) -> crate::Result<Vec<u8>>
where
    I: IntoIterator<Item = crate::Result<DynamicImage>>,
{
    let mut assembler = PdfAssembler::new(dpi);
    for page in pages {
        assembler.add_page(&page?)?;
    }
    assembler.finish()
}

/// Temporary directory holding one PNG per processed page.
///
/// Removed by [`ScratchSpace::close`], or on drop if the request ends early.
pub struct ScratchSpace {
    dir: TempDir,
    pages: Vec<PathBuf>,
}

impl ScratchSpace {
    pub fn new() -> Result<Self, ScratchError> {
        let dir = tempfile::Builder::new()
            .prefix("refmark-")
            .tempdir()
            .map_err(ScratchError::Create)?;
        debug!("Scratch space at {}", dir.path().display());
        Ok(Self {
            dir,
            pages: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store a page bitmap; pages are reassembled in the order they were stored.
    pub fn persist_page(&mut self, index: usize, image: &DynamicImage) -> Result<&Path, ScratchError> {
        let path = self.dir.path().join(format!("page_{:04}.png", index));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| ScratchError::Write {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.pages.push(path);
        Ok(self.pages[self.pages.len() - 1].as_path())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Build the output PDF from the stored pages, loading one page at a time.
    pub fn assemble(&self, dpi: u32) -> crate::Result<Vec<u8>> {
        let pages = self.pages.iter().map(|path| {
            image::open(path).map_err(|e| {
                RefmarkError::Scratch(ScratchError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            })
        });
        images_to_pdf(pages, dpi)
    }

    /// Remove the directory now and report failures.
    pub fn close(self) -> Result<(), ScratchError> {
        self.dir.close().map_err(ScratchError::Remove)
    }

    /// Remove the directory, logging instead of failing.
    pub fn close_quietly(self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfExtractor;
    use image::RgbImage;

    #[test]
    fn test_images_to_pdf_keeps_order_and_size() {
        let pages = vec![
            DynamicImage::ImageRgb8(RgbImage::new(200, 100)),
            DynamicImage::ImageRgb8(RgbImage::new(100, 300)),
        ];
        let bytes = images_to_pdf(pages.into_iter().map(Ok), 200).unwrap();

        let pdf = PdfExtractor::load(&bytes).unwrap();
        assert_eq!(pdf.page_count(), 2);
        let (w, h) = pdf.page_size(1).unwrap();
        assert!((w - 72.0).abs() < 0.01 && (h - 36.0).abs() < 0.01);

        let second = pdf.extract_images(2).unwrap();
        assert_eq!(second[0].image.dimensions(), (100, 300));
    }

    #[test]
    fn test_empty_assembly_fails() {
        assert!(matches!(
            images_to_pdf(std::iter::empty(), 200),
            Err(RefmarkError::Pdf(PdfError::NoPages))
        ));
    }

    #[test]
    fn test_scratch_roundtrip_and_cleanup() {
        let mut scratch = ScratchSpace::new().unwrap();
        let dir = scratch.path().to_path_buf();

        scratch
            .persist_page(0, &DynamicImage::ImageRgb8(RgbImage::new(20, 10)))
            .unwrap();
        scratch
            .persist_page(1, &DynamicImage::ImageRgb8(RgbImage::new(10, 20)))
            .unwrap();
        assert_eq!(scratch.page_count(), 2);
        assert!(dir.join("page_0001.png").exists());

        let bytes = scratch.assemble(72).unwrap();
        assert_eq!(PdfExtractor::load(&bytes).unwrap().page_size(2).unwrap(), (10.0, 20.0));

        scratch.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_scratch_removed_on_drop() {
        let dir = {
            let scratch = ScratchSpace::new().unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
