//! Ingestion pipeline integration tests

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use glimpse::config::IngestConfig;
use glimpse::db;
use glimpse::ingest::{ChatProgress, ConsoleProgress, Ingestor};
use glimpse::media::{ImageStore, MediaProcessor};
use glimpse::models::{ModelPool, TextRecognizer};
use glimpse::platform::{
    HistoryMedia, HistoryMessage, MediaHandle, StickerSetInfo, StickerSetRef,
};
use glimpse::{DbPool, Error, Result};

mod common;
use common::{MockChat, MockHistory, setup_test_db, test_png};

/// OCR that always fails; only jobs carrying a hint succeed
struct BrokenOcr;

impl TextRecognizer for BrokenOcr {
    fn extract_text(&mut self, _image: &Path) -> Result<String> {
        Err(Error::Ocr("engine crashed".to_string()))
    }
}

fn photo(id: i64, handle: &str, hint: Option<&str>) -> HistoryMessage {
    HistoryMessage {
        id,
        media: Some(HistoryMedia::Photo(MediaHandle(handle.to_string()))),
        ocr_hint: hint.map(str::to_string),
    }
}

fn config(capacity: usize) -> IngestConfig {
    IngestConfig {
        queue_capacity: capacity,
        progress_interval: Duration::from_secs(3600),
    }
}

fn ingestor(
    pool: &DbPool,
    history: MockHistory,
    models: ModelPool,
    images: &Path,
    capacity: usize,
) -> Ingestor {
    let processor = Arc::new(MediaProcessor::new(
        pool.clone(),
        ImageStore::new(images),
        Arc::new(models),
    ));
    Ingestor::new(pool.clone(), Arc::new(history), processor, config(capacity))
}

fn three_photos() -> MockHistory {
    let mut history = MockHistory::new(-1_001_234, "memes");
    for (i, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
        history
            .media
            .insert((*name).to_string(), test_png(u8::try_from(i).unwrap()));
    }
    history.messages = vec![
        photo(1, "a.png", Some("first")),
        HistoryMessage {
            id: 2,
            media: None,
            ocr_hint: None,
        },
        photo(3, "b.png", Some("second")),
        HistoryMessage {
            id: 4,
            media: Some(HistoryMedia::Other),
            ocr_hint: None,
        },
        photo(5, "c.png", Some("third")),
    ];
    history
}

#[tokio::test]
async fn test_run_ingests_photos_and_links_messages() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let ingestor = ingestor(&pool, three_photos(), ModelPool::empty(), tmp.path(), 16);

    let summary = ingestor.run("memes", Arc::new(ConsoleProgress)).await.unwrap();

    assert_eq!(summary.queued, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 2);
    assert!(summary.joined);

    let conn = db::connect(&pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 3);
    assert_eq!(db::channel::message_count(&conn, -1_001_234).unwrap(), 3);
    let stored = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(stored, 3);
}

#[tokio::test]
async fn test_queue_drains_even_when_jobs_fail() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let mut history = three_photos();
    // Two messages lose their OCR hint and hit the broken recognizer
    history.messages[0].ocr_hint = None;
    history.messages[2].ocr_hint = None;
    let models = ModelPool::new(Some(Box::new(BrokenOcr)), None).unwrap();
    // Capacity 1 forces the producer to wait on the consumer
    let ingestor = ingestor(&pool, history, models, tmp.path(), 1);

    let chat = MockChat::new();
    let sink = Arc::new(ChatProgress::new(chat.clone(), 10, Some(1)));
    let summary = ingestor.run("memes", sink).await.unwrap();

    assert_eq!(summary.queued, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 2);

    let reports: Vec<String> = chat
        .sent_texts()
        .into_iter()
        .filter(|t| t.starts_with("error processing"))
        .collect();
    // Failures arrive in one batched report
    assert_eq!(reports, vec!["error processing message 1\nerror processing message 3"]);

    let conn = db::connect(&pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 1);
    assert_eq!(db::channel::message_count(&conn, -1_001_234).unwrap(), 1);
}

#[tokio::test]
async fn test_progress_edits_one_status_message() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let ingestor = ingestor(&pool, three_photos(), ModelPool::empty(), tmp.path(), 16);

    let chat = MockChat::new();
    let sink = Arc::new(ChatProgress::new(chat.clone(), 10, Some(7)));
    ingestor.run("memes", sink).await.unwrap();

    let sent = chat.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "downloading memes...");
    assert_eq!(sent[0].reply_to, Some(7));

    let edits = chat.edits.lock().unwrap().clone();
    assert_eq!(
        edits,
        vec![(10, sent[0].message_id, "download finished: 3 queued, 3 processed".to_string())]
    );
}

#[tokio::test]
async fn test_rerun_skips_linked_messages() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();

    let first = ingestor(&pool, three_photos(), ModelPool::empty(), tmp.path(), 16);
    first.run("memes", Arc::new(ConsoleProgress)).await.unwrap();

    let second = ingestor(&pool, three_photos(), ModelPool::empty(), tmp.path(), 16);
    let summary = second.run("memes", Arc::new(ConsoleProgress)).await.unwrap();
    assert_eq!(summary.queued, 0);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 5);

    let conn = db::connect(&pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 3);
    assert_eq!(db::channel::message_count(&conn, -1_001_234).unwrap(), 3);
}

#[tokio::test]
async fn test_missing_media_is_reported_and_skipped() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let mut history = three_photos();
    history.media.remove("b.png");
    let ingestor = ingestor(&pool, history, ModelPool::empty(), tmp.path(), 16);

    let chat = MockChat::new();
    let summary = ingestor
        .run("memes", Arc::new(ChatProgress::new(chat.clone(), 10, None)))
        .await
        .unwrap();

    assert_eq!(summary.queued, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 3);
    assert!(chat
        .sent_texts()
        .iter()
        .any(|t| t.lines().any(|line| line == "error processing message 3")));
}

#[tokio::test]
async fn test_sticker_set_is_fetched_once_per_run() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let mut history = MockHistory::new(-1_005, "stickers");
    history.media.insert("s1".to_string(), test_png(0));
    history.media.insert("s2".to_string(), test_png(3));
    history.sticker_sets.insert(
        "cats".to_string(),
        StickerSetInfo {
            id: 77,
            short_name: "cats".to_string(),
            title: "Cats".to_string(),
            documents: vec![MediaHandle("s1".to_string()), MediaHandle("s2".to_string())],
        },
    );
    let sticker = |id| HistoryMessage {
        id,
        media: Some(HistoryMedia::Sticker(StickerSetRef {
            short_name: "cats".to_string(),
        })),
        ocr_hint: None,
    };
    history.messages = vec![sticker(1), sticker(2), sticker(3)];
    let history = Arc::new(history);

    let processor = Arc::new(MediaProcessor::new(
        pool.clone(),
        ImageStore::new(tmp.path()),
        Arc::new(ModelPool::empty()),
    ));
    let ingestor = Ingestor::new(pool.clone(), history.clone(), processor, config(16));
    let summary = ingestor.run("stickers", Arc::new(ConsoleProgress)).await.unwrap();

    assert_eq!(history.sticker_set_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.queued, 2);
    assert_eq!(summary.processed, 2);

    let conn = db::connect(&pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 2);
    let hit = db::image::most_used(&conn, 1, 0).unwrap().remove(0);
    let set = db::sticker::set_for_image(&conn, hit.id).unwrap().unwrap();
    assert_eq!(set.short_name, "cats");
    assert_eq!(set.title, "Cats");
}

#[tokio::test]
async fn test_unknown_channel_aborts_before_queueing() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let ingestor = ingestor(&pool, three_photos(), ModelPool::empty(), tmp.path(), 16);

    let chat = MockChat::new();
    let result = ingestor
        .run("nope", Arc::new(ChatProgress::new(chat.clone(), 10, None)))
        .await;

    assert!(matches!(result, Err(Error::ChannelNotFound(_))));
    assert!(chat.sent_texts().is_empty());
    let conn = db::connect(&pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 0);
}

#[tokio::test]
async fn test_join_failure_is_reported_not_fatal() {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let mut history = three_photos();
    history.join_error = Some("flood wait".to_string());
    let ingestor = ingestor(&pool, history, ModelPool::empty(), tmp.path(), 16);

    let chat = MockChat::new();
    let summary = ingestor
        .run("memes", Arc::new(ChatProgress::new(chat.clone(), 10, None)))
        .await
        .unwrap();

    assert!(!summary.joined);
    assert_eq!(summary.processed, 3);
    assert!(chat
        .sent_texts()
        .iter()
        .any(|t| t.starts_with("failed to join memes")));
}
