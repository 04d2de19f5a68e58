//! Append-only log of inline results users actually picked

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::Result;

/// Record that `user_id` selected `image_id`, if that image exists
///
/// The existence check and the insert are one statement. Returns whether a
/// row was written.
///
/// # Errors
///
/// Returns error if the insert fails
pub fn record_existing(conn: &Connection, image_id: i64, user_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        r"
        INSERT INTO image_usage (image_id, user_id, created_at)
        SELECT id, ?2, ?3 FROM images WHERE id = ?1
        ",
        params![image_id, user_id, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

/// Number of times an image was picked
///
/// # Errors
///
/// Returns error if the query fails
pub fn count_for_image(conn: &Connection, image_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM image_usage WHERE image_id = ?1",
        [image_id],
        |row| row.get(0),
    )?)
}
