//! Shared fakes and in-memory PDFs for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf_translate::{
    FileRecord, LanguageDetector, MetadataStore, ObjectStore, StorageError, TranslateError,
    TranslationProvider,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

// ── PDFs ─────────────────────────────────────────────────────────────────────

/// Build a PDF with one page per entry; each `(text, y)` is one Helvetica
/// 12pt line at x = 72. Lines more than two line-heights apart become
/// separate blocks.
pub fn pdf(pages: &[&[(&str, f32)]]) -> Vec<u8> {
    let sized: Vec<Vec<(&str, f32, f32)>> = pages
        .iter()
        .map(|lines| lines.iter().map(|(t, y)| (*t, *y, 12.0)).collect())
        .collect();
    let refs: Vec<&[(&str, f32, f32)]> = sized.iter().map(Vec::as_slice).collect();
    pdf_sized(&refs)
}

/// Like [`pdf`] with an explicit font size per `(text, y, size)` line.
pub fn pdf_sized(pages: &[&[(&str, f32, f32)]]) -> Vec<u8> {
    pdf_in_font("Helvetica", pages)
}

/// Like [`pdf_sized`] with every line set in `base_font`.
pub fn pdf_in_font(base_font: &str, pages: &[&[(&str, f32, f32)]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (text, y, size) in lines.iter() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
            operations.push(Operation::new("Td", vec![72.into(), (*y).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let bytes = Content { operations }.encode().unwrap();
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
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
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Write `bytes` to `dir/name` and return the path as a string.
pub fn write_input(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path.to_string_lossy().into_owned()
}

/// All files directly inside `dir`.
pub fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

// ── Detectors ────────────────────────────────────────────────────────────────

/// Looks text up by substring; anything unmatched is English.
#[derive(Default)]
pub struct KeywordDetector {
    keywords: Vec<(&'static str, &'static str)>,
    pub calls: Mutex<Vec<String>>,
}

impl KeywordDetector {
    pub fn new(keywords: &[(&'static str, &'static str)]) -> Self {
        Self {
            keywords: keywords.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageDetector for KeywordDetector {
    async fn detect(&self, text: &str) -> Result<String, TranslateError> {
        self.calls.lock().unwrap().push(text.to_string());
        let lang = self
            .keywords
            .iter()
            .find(|(k, _)| text.contains(k))
            .map(|(_, l)| *l)
            .unwrap_or("en");
        Ok(lang.to_string())
    }
}

pub struct DownDetector;

#[async_trait]
impl LanguageDetector for DownDetector {
    async fn detect(&self, _text: &str) -> Result<String, TranslateError> {
        Err(TranslateError::DetectionUnavailable {
            reason: "service unavailable".into(),
        })
    }
}

// ── Translators ──────────────────────────────────────────────────────────────

/// Fixed phrase book; unknown text comes back tagged with the target.
#[derive(Default)]
pub struct PhraseBook {
    phrases: HashMap<&'static str, &'static str>,
    pub calls: Mutex<Vec<String>>,
}

impl PhraseBook {
    pub fn new(phrases: &[(&'static str, &'static str)]) -> Self {
        Self {
            phrases: phrases.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationProvider for PhraseBook {
    fn name(&self) -> &str {
        "phrasebook"
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(self
            .phrases
            .get(text)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{target}: {text}")))
    }
}

/// Answers later blocks first: each call sleeps longer the earlier its text
/// appears in `order`.
pub struct StaggeredTranslator {
    order: Vec<&'static str>,
    step: Duration,
    pub finished: Mutex<Vec<String>>,
}

impl StaggeredTranslator {
    pub fn new(order: &[&'static str], step: Duration) -> Self {
        Self {
            order: order.to_vec(),
            step,
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationProvider for StaggeredTranslator {
    fn name(&self) -> &str {
        "staggered"
    }

    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError> {
        let position = self.order.iter().position(|t| *t == text).unwrap_or(0);
        let remaining = (self.order.len() - position) as u32;
        tokio::time::sleep(self.step * remaining).await;
        self.finished.lock().unwrap().push(text.to_string());
        Ok(format!("{target}: {text}"))
    }
}

pub struct RateLimitedTranslator;

#[async_trait]
impl TranslationProvider for RateLimitedTranslator {
    fn name(&self) -> &str {
        "limited"
    }

    async fn translate(&self, _text: &str, _target: &str) -> Result<String, TranslateError> {
        Err(TranslateError::RateLimited {
            provider: "limited".into(),
            retry_after_secs: Some(60),
        })
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

pub struct BrokenObjectStore;

#[async_trait]
impl ObjectStore for BrokenObjectStore {
    async fn upload(&self, path: &Path) -> Result<String, StorageError> {
        Err(StorageError::UploadFailed {
            path: path.display().to_string(),
            reason: "bucket unreachable".into(),
        })
    }
}

pub struct MemoryObjectStore;

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &Path) -> Result<String, StorageError> {
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(format!("mem://bucket/{name}"))
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    pub records: Mutex<Vec<FileRecord>>,
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn record(&self, record: FileRecord) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

// ── Output readers ───────────────────────────────────────────────────────────

/// `word/document.xml` of a `.docx`.
pub fn docx_body(path: &Path) -> String {
    use std::io::Read;
    let file = std::fs::File::open(path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut xml = String::new();
    zip.by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

/// Bytes of every string shown with `Tj` on each page, concatenated.
pub fn shown_text(doc: &Document, page_index: usize) -> Vec<u8> {
    let page_id = *doc.get_pages().values().nth(page_index).unwrap();
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    let mut out = Vec::new();
    for op in content.operations.iter().filter(|op| op.operator == "Tj") {
        if let Ok(bytes) = op.operands[0].as_str() {
            out.extend_from_slice(bytes);
            out.push(b' ');
        }
    }
    out
}

/// Names of the optional content groups in the catalog.
pub fn layer_names(doc: &Document) -> Vec<String> {
    let catalog = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_dictionary(id))
        .unwrap();
    let Ok(props) = catalog.get(b"OCProperties") else {
        return Vec::new();
    };
    let props = match props {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
        other => other.as_dict().unwrap(),
    };
    props
        .get(b"OCGs")
        .and_then(Object::as_array)
        .unwrap()
        .iter()
        .filter_map(|o| o.as_reference().ok())
        .filter_map(|id| doc.get_dictionary(id).ok())
        .filter_map(|d| d.get(b"Name").ok())
        .filter_map(|n| n.as_str().ok())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .collect()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
