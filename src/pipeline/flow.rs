//! Flow reconstructor: translated blocks as a DOCX document.
//!
//! ## Why write WordprocessingML by hand?
//!
//! A `.docx` is a zip of a handful of XML parts. Emitting the five parts a
//! word processor needs with `quick-xml` keeps the output exact and lets
//! tests read it back with the same two crates, without a document-model
//! dependency.
//!
//! Each block becomes one `<w:p>` in input order. Its single run carries the
//! block's font family (`w:rFonts`, all four script slots) and size
//! (`w:sz`, in half-points). Layout is not preserved: text flows.

use crate::document::TranslatedBlock;
use crate::error::TranslateError;
use crate::pipeline::load::strip_subset_prefix;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

/// Text and style of one output paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowBlock {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
}

impl From<&TranslatedBlock> for FlowBlock {
    fn from(tb: &TranslatedBlock) -> Self {
        Self {
            text: tb.translated_text.clone(),
            font_family: tb.block.font_family.clone(),
            font_size: tb.block.font_size,
        }
    }
}

/// A paragraph as it will be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub text: String,
    pub font_family: String,
    /// Size in half-points, as stored in `w:sz`.
    pub half_points: u32,
}

impl Paragraph {
    pub fn font_size(&self) -> f32 {
        self.half_points as f32 / 2.0
    }
}

/// In-memory flow document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowDocument {
    paragraphs: Vec<Paragraph>,
    language: Option<String>,
    title: Option<String>,
}

impl FlowDocument {
    /// One paragraph per block, in order.
    pub fn build(blocks: &[FlowBlock]) -> Self {
        let paragraphs = blocks
            .iter()
            .map(|b| Paragraph {
                text: b.text.clone(),
                font_family: strip_subset_prefix(&b.font_family).to_string(),
                half_points: (b.font_size * 2.0).round().max(1.0) as u32,
            })
            .collect();
        Self {
            paragraphs,
            language: None,
            title: None,
        }
    }

    /// Tag runs with a language (`w:lang`), e.g. the translation target.
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language = Some(code.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    /// Serialise to a `.docx` package.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TranslateError> {
        let document_xml = self.document_xml()?;
        let core_xml = self.core_xml()?;
        let document_rels = document_rels();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let parts: [(&str, &[u8]); 5] = [
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", ROOT_RELS.as_bytes()),
            ("word/document.xml", document_xml.as_slice()),
            ("word/_rels/document.xml.rels", document_rels.as_bytes()),
            ("docProps/core.xml", core_xml.as_slice()),
        ];
        for (name, data) in parts {
            zip.start_file(name, options).map_err(zip_error)?;
            zip.write_all(data)
                .map_err(|e| TranslateError::Internal(format!("DOCX part {name}: {e}")))?;
        }
        let bytes = zip.finish().map_err(zip_error)?.into_inner();
        debug!(
            "DOCX package: {} paragraphs, {} bytes",
            self.paragraphs.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Write the package to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), TranslateError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| TranslateError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn document_xml(&self) -> Result<Vec<u8>, TranslateError> {
        let mut w = Writer::new(Vec::new());
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_error)?;

        let mut root = BytesStart::new("w:document");
        root.push_attribute(("xmlns:w", WORD_NS));
        w.write_event(Event::Start(root)).map_err(xml_error)?;
        w.write_event(Event::Start(BytesStart::new("w:body")))
            .map_err(xml_error)?;

        for p in &self.paragraphs {
            self.write_paragraph(&mut w, p).map_err(xml_error)?;
        }

        w.write_event(Event::End(BytesEnd::new("w:body")))
            .map_err(xml_error)?;
        w.write_event(Event::End(BytesEnd::new("w:document")))
            .map_err(xml_error)?;
        Ok(w.into_inner())
    }

    fn write_paragraph(
        &self,
        w: &mut Writer<Vec<u8>>,
        p: &Paragraph,
    ) -> Result<(), quick_xml::Error> {
        w.write_event(Event::Start(BytesStart::new("w:p")))?;
        w.write_event(Event::Start(BytesStart::new("w:r")))?;

        w.write_event(Event::Start(BytesStart::new("w:rPr")))?;
        let mut fonts = BytesStart::new("w:rFonts");
        for slot in ["w:ascii", "w:hAnsi", "w:cs", "w:eastAsia"] {
            fonts.push_attribute((slot, p.font_family.as_str()));
        }
        w.write_event(Event::Empty(fonts))?;
        let half_points = p.half_points.to_string();
        let mut sz = BytesStart::new("w:sz");
        sz.push_attribute(("w:val", half_points.as_str()));
        w.write_event(Event::Empty(sz))?;
        let mut sz_cs = BytesStart::new("w:szCs");
        sz_cs.push_attribute(("w:val", half_points.as_str()));
        w.write_event(Event::Empty(sz_cs))?;
        if let Some(lang) = &self.language {
            let mut el = BytesStart::new("w:lang");
            el.push_attribute(("w:val", lang.as_str()));
            w.write_event(Event::Empty(el))?;
        }
        w.write_event(Event::End(BytesEnd::new("w:rPr")))?;

        for (i, line) in p.text.split('\n').enumerate() {
            if i > 0 {
                w.write_event(Event::Empty(BytesStart::new("w:br")))?;
            }
            let mut t = BytesStart::new("w:t");
            t.push_attribute(("xml:space", "preserve"));
            w.write_event(Event::Start(t))?;
            w.write_event(Event::Text(BytesText::new(line)))?;
            w.write_event(Event::End(BytesEnd::new("w:t")))?;
        }

        w.write_event(Event::End(BytesEnd::new("w:r")))?;
        w.write_event(Event::End(BytesEnd::new("w:p")))?;
        Ok(())
    }

    fn core_xml(&self) -> Result<Vec<u8>, TranslateError> {
        let mut w = Writer::new(Vec::new());
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_error)?;

        let mut root = BytesStart::new("cp:coreProperties");
        root.push_attribute((
            "xmlns:cp",
            "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
        ));
        root.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
        root.push_attribute(("xmlns:dcterms", "http://purl.org/dc/terms/"));
        root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        w.write_event(Event::Start(root)).map_err(xml_error)?;

        let created = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let mut elements: Vec<(&str, Option<(&str, &str)>, String)> = vec![
            ("dc:creator", None, env!("CARGO_PKG_NAME").to_string()),
            (
                "dcterms:created",
                Some(("xsi:type", "dcterms:W3CDTF")),
                created,
            ),
        ];
        if let Some(title) = &self.title {
            elements.push(("dc:title", None, title.clone()));
        }
        if let Some(lang) = &self.language {
            elements.push(("dc:language", None, lang.clone()));
        }

        for (name, attr, value) in elements {
            let mut el = BytesStart::new(name);
            if let Some(a) = attr {
                el.push_attribute(a);
            }
            w.write_event(Event::Start(el)).map_err(xml_error)?;
            w.write_event(Event::Text(BytesText::new(&value)))
                .map_err(xml_error)?;
            w.write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_error)?;
        }

        w.write_event(Event::End(BytesEnd::new("cp:coreProperties")))
            .map_err(xml_error)?;
        Ok(w.into_inner())
    }
}

fn document_rels() -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{REL_NS}"></Relationships>"#)
}

fn xml_error(e: quick_xml::Error) -> TranslateError {
    TranslateError::Internal(format!("DOCX XML: {e}"))
}

fn zip_error(e: zip::result::ZipError) -> TranslateError {
    TranslateError::Internal(format!("DOCX package: {e}"))
}
