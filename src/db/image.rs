//! Image records keyed by perceptual hash

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;

/// A content-addressed image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: i64,
    /// 16 lowercase hex chars
    pub phash: String,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    /// Cached platform reference (Bot API photo `file_id`)
    pub file_ref: Option<String>,
}

/// A search candidate in ranked order
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHit {
    pub id: i64,
    pub phash: String,
    pub file_ref: Option<String>,
}

/// Serialize an embedding as little-endian f32 bytes (sqlite-vec layout)
#[must_use]
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding blob
#[must_use]
pub fn embedding_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect()
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
    let embedding: Option<Vec<u8>> = row.get(3)?;
    Ok(Image {
        id: row.get(0)?,
        phash: row.get(1)?,
        text: row.get(2)?,
        embedding: embedding.map(|b| embedding_from_bytes(&b)),
        file_ref: row.get(4)?,
    })
}

fn row_to_hit(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageHit> {
    Ok(ImageHit {
        id: row.get(0)?,
        phash: row.get(1)?,
        file_ref: row.get(2)?,
    })
}

/// Find an image by perceptual hash
///
/// # Errors
///
/// Returns error if the query fails
pub fn find_by_phash(conn: &Connection, phash: &str) -> Result<Option<Image>> {
    let image = conn
        .query_row(
            "SELECT id, phash, text, embedding, file_ref FROM images WHERE phash = ?1",
            [phash],
            row_to_image,
        )
        .optional()?;
    Ok(image)
}

/// Find an image by id
///
/// # Errors
///
/// Returns error if the query fails
pub fn get(conn: &Connection, id: i64) -> Result<Option<Image>> {
    let image = conn
        .query_row(
            "SELECT id, phash, text, embedding, file_ref FROM images WHERE id = ?1",
            [id],
            row_to_image,
        )
        .optional()?;
    Ok(image)
}

/// Return the id for `phash`, inserting a bare row if absent
///
/// The boolean is true when the row was created by this call.
///
/// # Errors
///
/// Returns error if the insert fails
pub fn get_or_create(conn: &Connection, phash: &str) -> Result<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT INTO images (phash) VALUES (?1) ON CONFLICT(phash) DO NOTHING",
        [phash],
    )?;
    let id = conn.query_row("SELECT id FROM images WHERE phash = ?1", [phash], |row| {
        row.get(0)
    })?;
    Ok((id, inserted > 0))
}

/// Set OCR text only if it is still empty
///
/// # Errors
///
/// Returns error if the update fails
pub fn backfill_text(conn: &Connection, id: i64, text: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE images SET text = ?2 WHERE id = ?1 AND (text IS NULL OR text = '')",
        params![id, text],
    )?;
    Ok(updated > 0)
}

/// Set the embedding only if it is still empty
///
/// # Errors
///
/// Returns error if the update fails
pub fn backfill_embedding(conn: &Connection, id: i64, embedding: &[f32]) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE images SET embedding = ?2 WHERE id = ?1 AND embedding IS NULL",
        params![id, embedding_to_bytes(embedding)],
    )?;
    Ok(updated > 0)
}

/// Store the platform reference obtained by uploading this image
///
/// # Errors
///
/// Returns error if the update fails
pub fn set_file_ref(conn: &Connection, id: i64, file_ref: &str) -> Result<()> {
    conn.execute(
        "UPDATE images SET file_ref = ?2 WHERE id = ?1",
        params![id, file_ref],
    )?;
    Ok(())
}

/// Rank images against a text query
///
/// Score is trigram distance over OCR text, averaged with cosine distance
/// when a query vector is given and the image carries an embedding of the
/// same size. Rows scoring below `max_distance` are returned by ascending
/// score, ties by id.
///
/// # Errors
///
/// Returns error if the query fails
pub fn search(
    conn: &Connection,
    query: &str,
    query_vector: Option<&[f32]>,
    max_distance: f64,
    limit: usize,
    offset: usize,
) -> Result<Vec<ImageHit>> {
    let vector = query_vector.map(embedding_to_bytes);
    let mut stmt = conn.prepare_cached(
        r"
        SELECT id, phash, file_ref FROM (
            SELECT i.id, i.phash, i.file_ref,
                CASE
                    WHEN ?2 IS NOT NULL AND i.embedding IS NOT NULL
                        AND length(i.embedding) = length(?2)
                    THEN 0.5 * trigram_distance(i.text, ?1)
                        + 0.5 * vec_distance_cosine(i.embedding, ?2)
                    ELSE trigram_distance(i.text, ?1)
                END AS score
            FROM images i
        )
        WHERE score < ?3
        ORDER BY score, id
        LIMIT ?4 OFFSET ?5
        ",
    )?;
    let rows = stmt.query_map(
        params![query, vector, max_distance, to_sql_count(limit), to_sql_count(offset)],
        row_to_hit,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Images ordered by how often users picked them, newest first on ties
///
/// # Errors
///
/// Returns error if the query fails
pub fn most_used(conn: &Connection, limit: usize, offset: usize) -> Result<Vec<ImageHit>> {
    let mut stmt = conn.prepare_cached(
        r"
        SELECT i.id, i.phash, i.file_ref
        FROM images i
        LEFT JOIN image_usage u ON u.image_id = i.id
        GROUP BY i.id
        ORDER BY COUNT(u.id) DESC, i.id DESC
        LIMIT ?1 OFFSET ?2
        ",
    )?;
    let rows = stmt.query_map(
        params![to_sql_count(limit), to_sql_count(offset)],
        row_to_hit,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Total number of stored images
///
/// # Errors
///
/// Returns error if the query fails
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?)
}

fn to_sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
