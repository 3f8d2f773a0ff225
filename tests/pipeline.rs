//! Whole-pipeline tests with fake services and PDFs built in memory.
//!
//! Run with:
//!   cargo test --test pipeline

mod common;

use common::*;
use edgequake_pdf_translate::{
    MismatchPolicy, OutputMode, Pipeline, PipelineResult, ResponseKind, StorageError,
    TranslateError, TranslationConfig,
};
use lopdf::Document;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const HELLO: (&str, &str) = ("Hello world", "Bonjour le monde");

fn config(out: &Path, mode: OutputMode) -> TranslationConfig {
    TranslationConfig::builder()
        .source_language("en")
        .target_language("fr")
        .output_mode(mode)
        .output_dir(out)
        .build()
        .unwrap()
}

fn success(result: PipelineResult) -> (std::path::PathBuf, PipelineResult) {
    let path = result
        .output_path()
        .cloned()
        .unwrap_or_else(|| panic!("expected success, got {result:?}"));
    (path, result)
}

// ── Flow ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_world_flow_docx() {
    let scratch = tempfile::tempdir().unwrap();
    let input = write_input(scratch.path(), "hello.pdf", &pdf(&[&[("Hello world", 700.0)]]));
    let out = scratch.path().join("docs");

    let translator = Arc::new(PhraseBook::new(&[HELLO]));
    let pipeline = Pipeline::new(Arc::new(KeywordDetector::default()), translator.clone());
    let result = pipeline
        .process(&input, &config(&out, OutputMode::Flow))
        .await
        .unwrap();

    let (path, result) = success(result);
    assert_eq!(result.response_kind(), ResponseKind::Success);
    assert!(path.starts_with(&out));
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("hello-fr-"), "{name}");
    assert!(name.ends_with(".docx"));

    let xml = docx_body(&path);
    assert!(xml.contains("Bonjour le monde"));
    assert!(xml.contains(r#"w:ascii="Helvetica""#));
    assert!(xml.contains(r#"<w:sz w:val="24"/>"#));
    assert_eq!(xml.matches("<w:p>").count(), 1);
    assert_eq!(translator.calls(), vec!["Hello world".to_string()]);
}

#[tokio::test]
async fn flow_keeps_block_order_across_pages() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[
        &[("First", 700.0), ("Second", 600.0)],
        &[("Third", 700.0)],
    ]);
    let translator = Arc::new(PhraseBook::default());
    let pipeline = Pipeline::new(Arc::new(KeywordDetector::default()), translator.clone());
    let result = pipeline
        .process_bytes(&bytes, "order.pdf", &config(scratch.path(), OutputMode::Flow))
        .await
        .unwrap();

    let (path, result) = success(result);
    let xml = docx_body(&path);
    let a = xml.find("fr: First").unwrap();
    let b = xml.find("fr: Second").unwrap();
    let c = xml.find("fr: Third").unwrap();
    assert!(a < b && b < c);
    assert_eq!(translator.calls(), vec!["First", "Second", "Third"]);

    let PipelineResult::Success { stats, .. } = result else {
        unreachable!()
    };
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.blocks_total, 3);
    assert_eq!(stats.blocks_translated, 3);
    assert_eq!(stats.chunks_sent, 3);
}

#[tokio::test]
async fn two_arial_blocks_become_two_paragraphs() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf_in_font("Arial", &[&[("Hello world", 700.0, 12.0), ("Goodbye", 600.0, 12.0)]]);
    let translator = Arc::new(PhraseBook::new(&[HELLO, ("Goodbye", "Au revoir")]));
    let pipeline = Pipeline::new(Arc::new(KeywordDetector::default()), translator.clone());
    let result = pipeline
        .process_bytes(&bytes, "greeting.pdf", &config(scratch.path(), OutputMode::Flow))
        .await
        .unwrap();

    let (path, _) = success(result);
    let xml = docx_body(&path);
    let paragraphs: Vec<&str> = xml.split("<w:p>").skip(1).collect();
    assert_eq!(paragraphs.len(), 2);
    assert!(paragraphs[0].contains("Bonjour le monde"));
    assert!(paragraphs[1].contains("Au revoir"));
    for p in &paragraphs {
        assert!(p.contains(r#"w:ascii="Arial""#), "{p}");
        assert!(p.contains(r#"<w:sz w:val="24"/>"#), "{p}");
    }
    assert_eq!(translator.calls(), vec!["Hello world", "Goodbye"]);
}

#[tokio::test]
async fn long_block_is_chunked_and_joined() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[&[("one two three four", 700.0)]]);
    let translator = Arc::new(PhraseBook::default());
    let pipeline = Pipeline::new(Arc::new(KeywordDetector::default()), translator.clone());
    let config = TranslationConfig::builder()
        .target_language("de")
        .source_language("en")
        .output_dir(scratch.path())
        .max_chars(9)
        .build()
        .unwrap();

    let result = pipeline.process_bytes(&bytes, "long.pdf", &config).await.unwrap();
    let (path, _) = success(result);
    assert_eq!(translator.calls(), vec!["one two", "three", "four"]);
    assert!(docx_body(&path).contains("de: one two de: three de: four"));
}

// ── Overlay ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_world_overlay_pdf() {
    let scratch = tempfile::tempdir().unwrap();
    let source = pdf(&[&[("Hello world", 700.0)]]);
    let input = write_input(scratch.path(), "hello.pdf", &source);
    let out = scratch.path().join("docs");

    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    );
    let result = pipeline
        .process(&input, &config(&out, OutputMode::Overlay))
        .await
        .unwrap();

    let (path, result) = success(result);
    assert_eq!(path.extension().unwrap(), "pdf");
    let PipelineResult::Success { stats, .. } = &result else {
        unreachable!()
    };
    assert_eq!(stats.layout_skipped, 0);

    let doc = Document::load(&path).unwrap();
    assert_eq!(layer_names(&doc), vec!["fr".to_string()]);
    let shown = shown_text(&doc, 0);
    assert!(contains(&shown, b"Bonjour"), "{}", String::from_utf8_lossy(&shown));
    // The original text is still there, under the cover.
    assert!(contains(&shown, b"Hello world"));

    // The caller's file is untouched.
    assert_eq!(std::fs::read(&input).unwrap(), source);
}

#[tokio::test]
async fn overlay_too_small_box_keeps_cover_and_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf_sized(&[&[("Hello world", 700.0, 3.0)]]);
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    );
    let result = pipeline
        .process_bytes(&bytes, "tiny.pdf", &config(scratch.path(), OutputMode::Overlay))
        .await
        .unwrap();

    let (path, result) = success(result);
    let PipelineResult::Success { stats, .. } = &result else {
        unreachable!()
    };
    assert_eq!(stats.layout_skipped, 1);

    let doc = Document::load(&path).unwrap();
    let shown = shown_text(&doc, 0);
    assert!(!contains(&shown, b"Bonjour"));
    let page_id = *doc.get_pages().values().next().unwrap();
    let content = lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    assert!(content.operations.iter().any(|op| op.operator == "re"));
    assert!(content.operations.iter().any(|op| op.operator == "BDC"));
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn fail_fast_on_second_of_three_blocks() {
    let scratch = tempfile::tempdir().unwrap();
    let out = scratch.path().join("docs");
    let bytes = pdf(&[&[("Alpha", 700.0), ("Bonjour", 600.0), ("Gamma", 500.0)]]);

    let translator = Arc::new(PhraseBook::default());
    let detector = Arc::new(KeywordDetector::new(&[("Bonjour", "fr")]));
    let pipeline = Pipeline::new(detector.clone(), translator.clone());
    let result = pipeline
        .process_bytes(&bytes, "abc.pdf", &config(&out, OutputMode::Flow))
        .await
        .unwrap();

    let PipelineResult::Failure { warnings } = &result else {
        panic!("expected failure, got {result:?}");
    };
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].detected, "fr");
    assert_eq!(warnings[0].expected, "en");
    assert_eq!(warnings[0].block.block_index, 1);
    assert_eq!(result.response_kind(), ResponseKind::ValidationFailure);

    // A was translated, C was never looked at.
    assert_eq!(translator.calls(), vec!["Alpha"]);
    assert_eq!(*detector.calls.lock().unwrap(), vec!["Alpha", "Bonjour"]);
    assert!(files_in(&out).is_empty());
}

#[tokio::test]
async fn collect_warnings_leaves_mismatched_blocks_out() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[&[("Alpha", 700.0), ("Bonjour", 600.0), ("Gamma", 500.0)]]);
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::new(&[("Bonjour", "fr")])),
        Arc::new(PhraseBook::default()),
    );
    let config = TranslationConfig::builder()
        .source_language("en")
        .target_language("fr")
        .output_dir(scratch.path())
        .mismatch_policy(MismatchPolicy::CollectWarnings)
        .build()
        .unwrap();

    let result = pipeline.process_bytes(&bytes, "abc.pdf", &config).await.unwrap();
    let (path, result) = success(result);
    assert_eq!(result.warnings().len(), 1);
    let xml = docx_body(&path);
    assert!(xml.contains("fr: Alpha"));
    assert!(xml.contains("fr: Gamma"));
    assert!(!xml.contains("Bonjour"));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_blocks_are_reassembled_in_source_order() {
    let scratch = tempfile::tempdir().unwrap();
    let texts = ["One", "Two", "Three", "Four"];
    let bytes = pdf(&[&[
        (texts[0], 700.0),
        (texts[1], 600.0),
        (texts[2], 500.0),
        (texts[3], 400.0),
    ]]);
    let translator = Arc::new(StaggeredTranslator::new(&texts, Duration::from_millis(40)));
    let pipeline = Pipeline::new(Arc::new(KeywordDetector::default()), translator.clone());
    let config = TranslationConfig::builder()
        .source_language("en")
        .target_language("fr")
        .output_dir(scratch.path())
        .concurrency(4)
        .build()
        .unwrap();

    let result = pipeline.process_bytes(&bytes, "four.pdf", &config).await.unwrap();
    let (path, result) = success(result);

    // Later blocks finished first.
    assert_eq!(translator.finished(), vec!["Four", "Three", "Two", "One"]);

    let xml = docx_body(&path);
    let positions: Vec<usize> = texts
        .iter()
        .map(|t| xml.find(&format!("fr: {t}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");

    let PipelineResult::Success { stats, .. } = result else {
        unreachable!()
    };
    assert_eq!(stats.blocks_translated, 4);
}

#[tokio::test]
async fn concurrent_fail_fast_writes_nothing() {
    let scratch = tempfile::tempdir().unwrap();
    let out = scratch.path().join("docs");
    let texts = ["Alpha", "Bonjour", "Gamma"];
    let bytes = pdf(&[&[(texts[0], 700.0), (texts[1], 600.0), (texts[2], 500.0)]]);
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::new(&[("Bonjour", "fr")])),
        Arc::new(StaggeredTranslator::new(&texts, Duration::from_millis(20))),
    );
    let config = TranslationConfig::builder()
        .source_language("en")
        .target_language("fr")
        .output_dir(&out)
        .concurrency(4)
        .build()
        .unwrap();

    let result = pipeline.process_bytes(&bytes, "abc.pdf", &config).await.unwrap();
    let PipelineResult::Failure { warnings } = &result else {
        panic!("expected failure, got {result:?}");
    };
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].block.block_index, 1);
    assert_eq!(result.response_kind(), ResponseKind::ValidationFailure);
    assert!(files_in(&out).is_empty());
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn detection_outage_is_provider_failure() {
    let scratch = tempfile::tempdir().unwrap();
    let out = scratch.path().join("docs");
    let bytes = pdf(&[&[("Hello world", 700.0)]]);
    let translator = Arc::new(PhraseBook::default());
    let pipeline = Pipeline::new(Arc::new(DownDetector), translator.clone());

    let err = pipeline
        .process_bytes(&bytes, "a.pdf", &config(&out, OutputMode::Flow))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::DetectionUnavailable { .. }));
    assert_eq!(err.response_kind(), ResponseKind::ProviderFailure);
    assert!(translator.calls().is_empty());
    assert!(files_in(&out).is_empty());
}

#[tokio::test]
async fn rate_limit_aborts_without_output() {
    let scratch = tempfile::tempdir().unwrap();
    let out = scratch.path().join("docs");
    let bytes = pdf(&[&[("Hello world", 700.0)]]);
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(RateLimitedTranslator),
    );

    let err = pipeline
        .process_bytes(&bytes, "a.pdf", &config(&out, OutputMode::Flow))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        TranslateError::RateLimited {
            retry_after_secs: Some(60),
            ..
        }
    ));
    assert!(files_in(&out).is_empty());
}

#[tokio::test]
async fn non_pdf_is_unsupported_format() {
    let scratch = tempfile::tempdir().unwrap();
    let input = write_input(scratch.path(), "notes.txt", b"just some text\n");
    let detector = Arc::new(KeywordDetector::default());
    let pipeline = Pipeline::new(detector.clone(), Arc::new(PhraseBook::default()));

    let err = pipeline
        .process(&input, &config(scratch.path(), OutputMode::Flow))
        .await
        .unwrap_err();
    assert_eq!(err.response_kind(), ResponseKind::UnsupportedFormat);
    assert!(detector.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_file_is_invalid_request() {
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::default()),
    );
    let err = pipeline
        .process("/nowhere/at/all.pdf", &config(Path::new("docs"), OutputMode::Flow))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::FileNotFound { .. }));
    assert_eq!(err.response_kind(), ResponseKind::InvalidRequest);
}

// ── Output naming and storage ────────────────────────────────────────────────

#[tokio::test]
async fn repeated_runs_never_collide() {
    let scratch = tempfile::tempdir().unwrap();
    let input = write_input(scratch.path(), "same.pdf", &pdf(&[&[("Hello world", 700.0)]]));
    let out = scratch.path().join("docs");
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    );
    let config = config(&out, OutputMode::Flow);

    let (first, second) = tokio::join!(
        pipeline.process(&input, &config),
        pipeline.process(&input, &config)
    );
    let (a, _) = success(first.unwrap());
    let (b, _) = success(second.unwrap());
    assert_ne!(a, b);
    assert_eq!(files_in(&out).len(), 2);
}

#[tokio::test]
async fn storage_failure_does_not_fail_translation() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[&[("Hello world", 700.0)]]);
    let records = Arc::new(MemoryMetadataStore::default());
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    )
    .with_object_store(Arc::new(BrokenObjectStore))
    .with_metadata_store(records.clone());

    let result = pipeline
        .process_bytes(&bytes, "hello.pdf", &config(scratch.path(), OutputMode::Flow))
        .await
        .unwrap();

    let PipelineResult::Success {
        output_path,
        cloud_url,
        storage_errors,
        ..
    } = result
    else {
        panic!("storage failure must not turn success into failure");
    };
    assert!(output_path.exists());
    assert!(cloud_url.is_none());
    assert_eq!(storage_errors.len(), 1);
    assert!(matches!(storage_errors[0], StorageError::UploadFailed { .. }));

    // Without a URL the output record points at the local file.
    let records = records.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].filename, "hello.pdf");
    assert_eq!(records[1].location, output_path.display().to_string());
}

#[tokio::test]
async fn upload_url_is_returned_and_recorded() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[&[("Hello world", 700.0)]]);
    let records = Arc::new(MemoryMetadataStore::default());
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    )
    .with_object_store(Arc::new(MemoryObjectStore))
    .with_metadata_store(records.clone());

    let result = pipeline
        .process_bytes(&bytes, "hello.pdf", &config(scratch.path(), OutputMode::Overlay))
        .await
        .unwrap();
    let PipelineResult::Success {
        cloud_url,
        storage_errors,
        ..
    } = result
    else {
        panic!("expected success");
    };
    let url = cloud_url.unwrap();
    assert!(url.starts_with("mem://bucket/hello-fr-"));
    assert!(storage_errors.is_empty());

    let records = records.records.lock().unwrap();
    assert_eq!(records[1].location, url);
    assert_eq!(records[1].file_type, "pdf");
}

#[tokio::test]
async fn result_serialises_for_http_front_ends() {
    let scratch = tempfile::tempdir().unwrap();
    let bytes = pdf(&[&[("Hello world", 700.0)]]);
    let pipeline = Pipeline::new(
        Arc::new(KeywordDetector::default()),
        Arc::new(PhraseBook::new(&[HELLO])),
    );
    let result = pipeline
        .process_bytes(&bytes, "hello.pdf", &config(scratch.path(), OutputMode::Flow))
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["stats"]["blocks_translated"], 1);
}
