//! Sticker sets and the stickers that belong to them

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;

/// A sticker set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerSet {
    pub id: i64,
    pub short_name: String,
    pub title: String,
}

/// Insert or refresh a sticker set
///
/// # Errors
///
/// Returns error if the upsert fails
pub fn upsert_set(conn: &Connection, set: &StickerSet) -> Result<()> {
    conn.execute(
        r"
        INSERT INTO sticker_sets (id, short_name, title) VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            short_name = excluded.short_name,
            title = excluded.title
        ",
        params![set.id, set.short_name, set.title],
    )?;
    Ok(())
}

/// Link an image to a sticker set; an image already linked is a no-op
///
/// # Errors
///
/// Returns error if the insert fails
pub fn insert(conn: &Connection, image_id: i64, sticker_set_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        r"
        INSERT INTO stickers (image_id, sticker_set_id) VALUES (?1, ?2)
        ON CONFLICT(image_id) DO NOTHING
        ",
        params![image_id, sticker_set_id],
    )?;
    Ok(inserted > 0)
}

/// Sticker set an image belongs to
///
/// # Errors
///
/// Returns error if the query fails
pub fn set_for_image(conn: &Connection, image_id: i64) -> Result<Option<StickerSet>> {
    let set = conn
        .query_row(
            r"
            SELECT s.id, s.short_name, s.title
            FROM stickers k
            JOIN sticker_sets s ON s.id = k.sticker_set_id
            WHERE k.image_id = ?1
            ",
            [image_id],
            |row| {
                Ok(StickerSet {
                    id: row.get(0)?,
                    short_name: row.get(1)?,
                    title: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(set)
}
