//! Native `/Highlight` annotations.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::trace;

use super::Result;
use crate::error::PdfError;
use crate::highlight::HighlightStyle;
use crate::models::document::BoundingBox;

/// Attach a highlight annotation covering `rect` (PDF user space) to a page.
///
/// The annotation carries its own appearance stream so viewers that do not
/// synthesize highlight appearances still show it.
pub fn add_highlight(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    rect: &BoundingBox,
    style: &HighlightStyle,
) -> Result<ObjectId> {
    if rect.is_empty() {
        return Err(PdfError::Annotate {
            page: page_number,
            reason: "empty rectangle".to_string(),
        });
    }

    let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
    let [r, g, b] = style.annotation_color();
    let opacity = style.annotation_opacity.clamp(0.0, 1.0);

    let appearance = format!(
        "q /GS0 gs {:.3} {:.3} {:.3} rg 0 0 {:.2} {:.2} re f Q",
        r,
        g,
        b,
        rect.width,
        rect.height
    );
    let appearance_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => reals(&[0.0, 0.0, rect.width, rect.height]),
            "Matrix" => reals(&[1.0, 0.0, 0.0, 1.0, x0, y0]),
            "Resources" => dictionary! {
                "ExtGState" => dictionary! {
                    "GS0" => dictionary! {
                        "Type" => "ExtGState",
                        "CA" => Object::Real(opacity),
                        "ca" => Object::Real(opacity),
                        "BM" => "Multiply",
                    },
                },
            },
        },
        appearance.into_bytes(),
    ));

    let mut annot = Dictionary::new();
    annot.set("Type", Object::Name(b"Annot".to_vec()));
    annot.set("Subtype", Object::Name(b"Highlight".to_vec()));
    annot.set("Rect", reals(&[x0, y0, x1, y1]));
    annot.set("QuadPoints", reals(&[x0, y1, x1, y1, x0, y0, x1, y0]));
    annot.set("C", reals(&[r, g, b]));
    annot.set("CA", Object::Real(opacity));
    // Print flag
    annot.set("F", Object::Integer(4));
    annot.set("P", Object::Reference(page_id));
    annot.set("AP", dictionary! { "N" => appearance_id });

    let annot_id = doc.add_object(Object::Dictionary(annot));
    attach(doc, page_id, page_number, annot_id)?;
    trace!("Added highlight {:?} to page {}", annot_id, page_number);
    Ok(annot_id)
}

fn reals(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
}

fn attach(doc: &mut Document, page_id: ObjectId, page_number: u32, annot_id: ObjectId) -> Result<()> {
    let annotate_err = |reason: String| PdfError::Annotate {
        page: page_number,
        reason,
    };

    let existing = doc
        .get_dictionary(page_id)
        .map_err(|e| annotate_err(e.to_string()))?
        .get(b"Annots")
        .ok()
        .cloned();

    let mut annots = match existing {
        Some(Object::Array(arr)) => arr,
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    annots.push(Object::Reference(annot_id));

    doc.get_dictionary_mut(page_id)
        .map_err(|e| annotate_err(e.to_string()))?
        .set("Annots", Object::Array(annots));
    Ok(())
}

/// Highlight annotations currently attached to a page.
pub fn highlight_annotations(doc: &Document, page_id: ObjectId) -> Vec<&Dictionary> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let annots: &[Object] = match page.get(b"Annots") {
        Ok(Object::Array(arr)) => arr.as_slice(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    annots
        .iter()
        .filter_map(|o| match o {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        })
        .filter(|d| {
            d.get(b"Subtype").ok().and_then(|s| s.as_name().ok()) == Some(b"Highlight".as_slice())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::text_pdf;
    use crate::pdf::fonts::number;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_highlight_sets_geometry_and_colour() {
        let mut doc = text_pdf(&["Ref: AB-12 /"]);
        let page_id = doc.get_pages()[&1];
        let rect = BoundingBox::new(100.0, 700.0, 50.0, 12.0);

        add_highlight(&mut doc, page_id, 1, &rect, &HighlightStyle::default()).unwrap();
        add_highlight(&mut doc, page_id, 1, &rect, &HighlightStyle::default()).unwrap();

        let annots = highlight_annotations(&doc, page_id);
        assert_eq!(annots.len(), 2);

        let quad: Vec<f32> = annots[0]
            .get(b"QuadPoints")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| number(o).unwrap())
            .collect();
        assert_eq!(quad, vec![100.0, 712.0, 150.0, 712.0, 100.0, 700.0, 150.0, 700.0]);

        let colour: Vec<f32> = annots[0]
            .get(b"C")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| number(o).unwrap())
            .collect();
        assert_eq!(colour, vec![1.0, 1.0, 0.0]);
        assert!(annots[0].get(b"AP").is_ok());
    }

    #[test]
    fn test_empty_rect_rejected() {
        let mut doc = text_pdf(&["x"]);
        let page_id = doc.get_pages()[&1];
        let err = add_highlight(
            &mut doc,
            page_id,
            1,
            &BoundingBox::default(),
            &HighlightStyle::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PdfError::Annotate { page: 1, .. }));
        assert!(highlight_annotations(&doc, page_id).is_empty());
    }
}
