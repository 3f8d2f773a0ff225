//! In-memory PDFs for unit tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// One line of text placed with `Td`, in its own text object.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: &'static str,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Line {
    pub fn new(text: &'static str, x: f32, y: f32, size: f32) -> Self {
        Self { text, x, y, size }
    }
}

/// A4 document with one page per entry; fonts and MediaBox are inherited
/// from the page tree root.
pub fn pdf_document(pages: &[Vec<Line>]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for line in lines {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), line.size.into()]));
            operations.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let bytes = content.encode().unwrap_or_default();
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Serialised form of [`pdf_document`].
pub fn pdf_bytes(pages: &[Vec<Line>]) -> Vec<u8> {
    let mut doc = pdf_document(pages);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialise test PDF");
    out
}
