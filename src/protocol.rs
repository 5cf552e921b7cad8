//! Decoder for the line-delimited JSON records the backend prints on stdout.
//!
//! A record looks like
//!
//! ```text
//! {"is_playing":true,"song_title":"Song","artist":"Artist","current_lyric":"la la la","next_lyric":"","progress_ms":42500}
//! ```
//!
//! Only `is_playing` is required. Strings are delivered untruncated.


use serde::Deserialize;

use crate::{error::DecodeError, state::PlaybackState};

#[derive(Deserialize, Debug)]
pub struct BackendRecord {
    pub is_playing: bool,
    #[serde(default)]
    pub song_title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub current_lyric: Option<String>,
    #[serde(default)]
    pub next_lyric: Option<String>,
    #[serde(default)]
    pub progress_ms: Option<f64>,
}

impl TryFrom<BackendRecord> for PlaybackState {
    type Error = DecodeError;

    fn try_from(record: BackendRecord) -> Result<Self, Self::Error> {
        let position = record.progress_ms.map_or(0.0, |ms| ms / 1000.0);
        Ok(Self {
            artist: record.artist.unwrap_or_default(),
            title: record.song_title.unwrap_or_default(),
            is_playing: record.is_playing,
            current_lyric: record.current_lyric.unwrap_or_default(),
            next_lyric: record.next_lyric.unwrap_or_default(),
            position: check_timing("position", position)?,
            duration: 0.0,
            disconnected: false,
            last_updated_at: None,
        })
    }
}

/// Reject negative and non-finite seconds.
pub fn check_timing(field: &'static str, value: f64) -> Result<f64, DecodeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DecodeError::InvalidTiming { field, value })
    }
}

/// Decode one stdout line into a full replacement snapshot.
///
/// # Errors
///
/// [`DecodeError::NotARecord`] for lines that are not JSON objects at all (the backend also
/// prints status text), [`DecodeError::Malformed`] for objects missing `is_playing` or carrying
/// wrongly typed fields, [`DecodeError::InvalidTiming`] for a negative or non-finite position.
pub fn decode_line(line: &str) -> Result<PlaybackState, DecodeError> {
    let line = line.trim();
    if !line.starts_with('{') {
        return Err(DecodeError::NotARecord);
    }
    serde_json::from_str::<BackendRecord>(line)?.try_into()
}
