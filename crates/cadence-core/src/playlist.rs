//! Playback queue model
//!
//! A [`PlaylistState`] is the "now playing" data shared by every connection of a
//! session (and, for logged-in users, mirrored to their profile). All mutations
//! go through the methods below so the cursor invariant holds after each one:
//! the list is empty and the cursor is 0, or the cursor lies in `[0, len)`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// One queued audio item. Identity within a playlist is its `src`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast_title: Option<String>,
    /// Display duration as provided by the feed ("1:02:03" or seconds)
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub podcast_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub played: bool,
}

impl Track {
    /// Track with only a source
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            title: None,
            podcast_title: None,
            duration: None,
            poster: None,
            podcast_id: None,
            release_date: None,
            played: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_podcast(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.podcast_id = Some(id.into());
        self.podcast_title = Some(title.into());
        self
    }
}

/// Feed metadata mixes numeric and string ids; keep both as text.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Player options. Unset options are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuous: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<bool>,
    /// In `[0, 1]`, two-decimal precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// The playback queue and cursor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistState {
    #[serde(default)]
    pub options: PlaylistOptions,
    #[serde(default)]
    pub cursor_index: usize,
    /// Seconds into the current track
    #[serde(default)]
    pub cursor_time: f64,
    #[serde(default)]
    pub list: Vec<Track>,
}

impl PlaylistState {
    /// Empty playlist: `{options:{}, cursorIndex:0, cursorTime:0, list:[]}`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, src: &str) -> bool {
        self.list.iter().any(|t| t.src == src)
    }

    /// Track under the cursor
    pub fn current(&self) -> Option<&Track> {
        self.list.get(self.cursor_index)
    }

    /// Queue a track at the end, or at the front when `insert` is set.
    ///
    /// Prepending keeps the cursor on the track it pointed at.
    pub fn add_track(&mut self, track: Track, insert: bool) -> Result<()> {
        if self.contains(&track.src) {
            return Err(Error::DuplicateTrack(track.src));
        }

        if insert {
            let had_tracks = !self.list.is_empty();
            self.list.insert(0, track);
            if had_tracks {
                self.cursor_index += 1;
            }
        } else {
            self.list.push(track);
        }

        self.normalize_cursor();
        Ok(())
    }

    /// Remove the track at `index`.
    ///
    /// `new_index` overrides the cursor; otherwise removing a track ahead of the
    /// cursor moves the cursor back so it stays on the same track.
    pub fn remove_track(&mut self, index: usize, new_index: Option<usize>) -> Result<Track> {
        if index >= self.list.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.list.len(),
            });
        }

        let removed = self.list.remove(index);
        match new_index {
            Some(i) => self.cursor_index = i,
            None if index < self.cursor_index => self.cursor_index -= 1,
            None => {}
        }

        self.normalize_cursor();
        Ok(removed)
    }

    /// Move the cursor.
    ///
    /// An omitted index keeps the current one; an omitted time resets to 0.
    pub fn update_cursor(&mut self, index: Option<usize>, time: Option<f64>) {
        if let Some(i) = index {
            self.cursor_index = i;
        }
        self.cursor_time = time
            .filter(|t| t.is_finite())
            .map(|t| t.max(0.0))
            .unwrap_or(0.0);
        self.normalize_cursor();
    }

    /// Set any of the player options; `None` leaves an option untouched
    pub fn update_options(
        &mut self,
        continuous: Option<bool>,
        repeat: Option<bool>,
        volume: Option<f64>,
    ) {
        if let Some(c) = continuous {
            self.options.continuous = Some(c);
        }
        if let Some(r) = repeat {
            self.options.repeat = Some(r);
        }
        if let Some(v) = volume.filter(|v| v.is_finite()) {
            self.options.volume = Some(floor_volume(v));
        }
    }

    /// Clamp the cursor into the list
    pub fn normalize_cursor(&mut self) {
        if self.list.is_empty() {
            self.cursor_index = 0;
        } else if self.cursor_index >= self.list.len() {
            self.cursor_index = self.list.len() - 1;
        }
    }
}

/// Clamp to `[0, 1]` and floor to two decimals
pub fn floor_volume(volume: f64) -> f64 {
    let clamped = volume.clamp(0.0, 1.0);
    // 1e-9 absorbs binary representation error (0.57 * 100 = 56.999...)
    ((clamped * 100.0) + 1e-9).floor() / 100.0
}
