//! Channels and the channel messages that carried an image

use rusqlite::{Connection, OptionalExtension, params};

use crate::Result;

/// A source channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    /// Public username, if the channel has one
    pub handle: Option<String>,
}

/// Where an image was first seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLink {
    ChannelMessage {
        channel_id: i64,
        handle: Option<String>,
        message_id: i64,
    },
    StickerSet {
        short_name: String,
    },
}

impl SourceLink {
    /// Public `t.me` URL for this source
    #[must_use]
    pub fn url(&self) -> String {
        match self {
            Self::ChannelMessage {
                handle: Some(handle),
                message_id,
                ..
            } => format!("https://t.me/{handle}/{message_id}"),
            Self::ChannelMessage {
                channel_id,
                handle: None,
                message_id,
            } => format!("https://t.me/c/{}/{message_id}", short_channel_id(*channel_id)),
            Self::StickerSet { short_name } => format!("https://t.me/addstickers/{short_name}"),
        }
    }
}

/// Strip the Bot API `-100` prefix from a channel id for `t.me/c/` links
#[must_use]
pub fn short_channel_id(channel_id: i64) -> i64 {
    const PREFIX: i64 = 1_000_000_000_000;
    if channel_id <= -PREFIX {
        -channel_id - PREFIX
    } else {
        channel_id.abs()
    }
}

/// Return the channel, creating it on first reference
///
/// An existing row keeps its id; name and handle are refreshed.
///
/// # Errors
///
/// Returns error if the upsert fails
pub fn get_or_create(
    conn: &Connection,
    id: i64,
    name: &str,
    handle: Option<&str>,
) -> Result<Channel> {
    conn.execute(
        r"
        INSERT INTO channels (id, name, handle) VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            handle = COALESCE(excluded.handle, channels.handle)
        ",
        params![id, name, handle],
    )?;
    let channel = conn.query_row(
        "SELECT id, name, handle FROM channels WHERE id = ?1",
        [id],
        |row| {
            Ok(Channel {
                id: row.get(0)?,
                name: row.get(1)?,
                handle: row.get(2)?,
            })
        },
    )?;
    Ok(channel)
}

/// Link a channel message to an image; a duplicate link is a no-op
///
/// Returns true if a new link was written.
///
/// # Errors
///
/// Returns error if the insert fails
pub fn insert_message(
    conn: &Connection,
    channel_id: i64,
    message_id: i64,
    image_id: i64,
) -> Result<bool> {
    let inserted = conn.execute(
        r"
        INSERT INTO channel_messages (channel_id, message_id, image_id) VALUES (?1, ?2, ?3)
        ON CONFLICT(channel_id, message_id) DO NOTHING
        ",
        params![channel_id, message_id, image_id],
    )?;
    Ok(inserted > 0)
}

/// Whether a channel message has already been ingested
///
/// # Errors
///
/// Returns error if the query fails
pub fn message_exists(conn: &Connection, channel_id: i64, message_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM channel_messages WHERE channel_id = ?1 AND message_id = ?2",
            params![channel_id, message_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Number of messages linked for a channel
///
/// # Errors
///
/// Returns error if the query fails
pub fn message_count(conn: &Connection, channel_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM channel_messages WHERE channel_id = ?1",
        [channel_id],
        |row| row.get(0),
    )?)
}

/// Earliest source of an image: a channel message, else its sticker set
///
/// # Errors
///
/// Returns error if the query fails
pub fn find_source(conn: &Connection, image_id: i64) -> Result<Option<SourceLink>> {
    let message = conn
        .query_row(
            r"
            SELECT m.channel_id, c.handle, m.message_id
            FROM channel_messages m
            JOIN channels c ON c.id = m.channel_id
            WHERE m.image_id = ?1
            ORDER BY m.channel_id, m.message_id
            LIMIT 1
            ",
            [image_id],
            |row| {
                Ok(SourceLink::ChannelMessage {
                    channel_id: row.get(0)?,
                    handle: row.get(1)?,
                    message_id: row.get(2)?,
                })
            },
        )
        .optional()?;
    if message.is_some() {
        return Ok(message);
    }

    let set = super::sticker::set_for_image(conn, image_id)?;
    Ok(set.map(|s| SourceLink::StickerSet {
        short_name: s.short_name,
    }))
}
