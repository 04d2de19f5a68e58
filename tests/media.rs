//! Media processor integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glimpse::db;
use glimpse::media::{ImageStore, Link, MediaItem, MediaProcessor, PerceptualHash};
use glimpse::models::{ImageEmbedder, ModelPool, TextRecognizer};
use glimpse::{DbPool, Result};

mod common;
use common::{setup_test_db, test_png};

/// OCR returning a fixed text and counting calls
struct CountingOcr {
    text: &'static str,
    calls: Arc<AtomicUsize>,
}

impl TextRecognizer for CountingOcr {
    fn extract_text(&mut self, _image: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

struct CountingEmbedder {
    calls: Arc<AtomicUsize>,
}

impl ImageEmbedder for CountingEmbedder {
    fn dimensions(&self) -> usize {
        4
    }

    fn embed_image(&mut self, _image: &Path) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    fn embed_text(&mut self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

struct Fixture {
    pool: DbPool,
    processor: MediaProcessor,
    ocr_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    _tmp: tempfile::TempDir,
    source: PathBuf,
    phash: PerceptualHash,
}

fn fixture(ocr_text: &'static str) -> Fixture {
    let pool = setup_test_db();
    let tmp = tempfile::tempdir().unwrap();
    let png = test_png(3);
    let source = tmp.path().join("download.png");
    std::fs::write(&source, &png).unwrap();
    let phash = PerceptualHash::of_bytes(&png).unwrap();

    let ocr_calls = Arc::new(AtomicUsize::new(0));
    let embed_calls = Arc::new(AtomicUsize::new(0));
    let models = ModelPool::new(
        Some(Box::new(CountingOcr {
            text: ocr_text,
            calls: ocr_calls.clone(),
        })),
        Some(Box::new(CountingEmbedder {
            calls: embed_calls.clone(),
        })),
    )
    .unwrap();

    {
        let conn = db::connect(&pool).unwrap();
        db::channel::get_or_create(&conn, -100_500, "Memes", None).unwrap();
    }

    let processor = MediaProcessor::new(
        pool.clone(),
        ImageStore::new(tmp.path().join("images")),
        Arc::new(models),
    );
    Fixture {
        pool,
        processor,
        ocr_calls,
        embed_calls,
        _tmp: tmp,
        source,
        phash,
    }
}

impl Fixture {
    fn item(&self, message_id: i64, ocr_hint: Option<&str>) -> MediaItem {
        MediaItem {
            file: self.source.clone(),
            phash: self.phash,
            link: Link::ChannelMessage {
                channel_id: -100_500,
                message_id,
            },
            ocr_hint: ocr_hint.map(str::to_string),
        }
    }

    fn stored_text(&self) -> Option<String> {
        let conn = db::connect(&self.pool).unwrap();
        db::image::find_by_phash(&conn, &self.phash.to_string())
            .unwrap()
            .unwrap()
            .text
    }
}

#[tokio::test]
async fn test_processing_is_idempotent() {
    let fx = fixture("caption");

    let first = fx.processor.process(fx.item(1, None)).await.unwrap();
    assert!(first.created);
    assert!(first.linked);

    let again = fx.processor.process(fx.item(1, None)).await.unwrap();
    assert_eq!(again.image_id, first.image_id);
    assert!(!again.created);
    assert!(!again.linked);

    let conn = db::connect(&fx.pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 1);
    assert_eq!(db::channel::message_count(&conn, -100_500).unwrap(), 1);

    // Filled fields are never recomputed
    assert_eq!(fx.ocr_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.embed_calls.load(Ordering::SeqCst), 1);
    let image = db::image::get(&conn, first.image_id).unwrap().unwrap();
    assert_eq!(image.embedding, Some(vec![1.0, 0.0, 0.0, 0.0]));

    let stored = fx.processor.store().path_for(fx.phash);
    assert!(stored.exists());
}

#[tokio::test]
async fn test_same_image_in_two_messages_shares_a_row() {
    let fx = fixture("caption");

    let a = fx.processor.process(fx.item(1, None)).await.unwrap();
    let b = fx.processor.process(fx.item(2, None)).await.unwrap();

    assert_eq!(a.image_id, b.image_id);
    assert!(b.linked);
    let conn = db::connect(&fx.pool).unwrap();
    assert_eq!(db::image::count(&conn).unwrap(), 1);
    assert_eq!(db::channel::message_count(&conn, -100_500).unwrap(), 2);
}

#[tokio::test]
async fn test_text_is_backfilled_but_never_overwritten() {
    // OCR finds nothing, leaving the text empty
    let fx = fixture("   ");

    fx.processor.process(fx.item(1, None)).await.unwrap();
    assert_eq!(fx.stored_text(), None);

    fx.processor.process(fx.item(2, Some("hello there"))).await.unwrap();
    assert_eq!(fx.stored_text().as_deref(), Some("hello there"));

    fx.processor.process(fx.item(3, Some("something else"))).await.unwrap();
    assert_eq!(fx.stored_text().as_deref(), Some("hello there"));

    // The hint replaced OCR on the second pass; the third needed nothing
    assert_eq!(fx.ocr_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sticker_links_are_idempotent() {
    let fx = fixture("caption");
    {
        let conn = db::connect(&fx.pool).unwrap();
        db::sticker::upsert_set(
            &conn,
            &db::StickerSet {
                id: 5,
                short_name: "pack".to_string(),
                title: "Pack".to_string(),
            },
        )
        .unwrap();
    }
    let item = MediaItem {
        link: Link::StickerSet { sticker_set_id: 5 },
        ..fx.item(0, None)
    };

    let first = fx.processor.process(item.clone()).await.unwrap();
    let second = fx.processor.process(item).await.unwrap();
    assert!(first.linked);
    assert!(!second.linked);

    let conn = db::connect(&fx.pool).unwrap();
    let set = db::sticker::set_for_image(&conn, first.image_id).unwrap().unwrap();
    assert_eq!(set.short_name, "pack");
}
