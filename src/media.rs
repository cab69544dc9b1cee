use std::{
    borrow::Borrow,
    fmt::Display,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// File extensions offered to the file picker and picked up by directory imports.
pub const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "flac", "aac"];

pub const DEFAULT_CATEGORY: u8 = 1;

/// Opaque identifier of a sound, unique within a store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoundId(String);

impl SoundId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SoundId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SoundId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for SoundId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Metadata of one sound clip.
///
/// A record without `file_path` is a virtual sound: playing it only
/// produces notifications, no audio reaches the output device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundRecord {
    pub title: String,
    #[serde(default = "default_category")]
    pub category: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub favorite: bool,
    /// Formatted as `M:SS`, see [`format_duration`]. Numeric seconds are
    /// accepted on input and formatted on the way in.
    #[serde(
        default,
        deserialize_with = "deserialize_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<String>,
}

fn default_category() -> u8 {
    DEFAULT_CATEGORY
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Formatted(String),
    Seconds(f64),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDuration>::deserialize(deserializer)?;
    Ok(raw.map(|raw| match raw {
        RawDuration::Formatted(s) => s,
        RawDuration::Seconds(secs) => format_duration(secs),
    }))
}

impl SoundRecord {
    pub fn new(title: impl Into<String>, category: u8) -> Self {
        Self {
            title: title.into(),
            category,
            file_path: None,
            favorite: false,
            duration: None,
        }
    }

    /// A record for `path`, titled after the file name without its extension.
    pub fn from_file(path: impl Into<PathBuf>, category: u8) -> Self {
        let path = path.into();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Self {
            file_path: Some(path),
            ..Self::new(title, category)
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.file_path.is_none()
    }
}

/// A record together with its id, as handed out by favorite listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdentifiedSound {
    pub id: SoundId,
    #[serde(flatten)]
    pub record: SoundRecord,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MediaSpec {
    pub sample_rate: u32,
    pub channel: u32,
}

/// Formats seconds as `M:SS`, truncating fractions.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn is_media_file(p: &Path) -> bool {
    p.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| AUDIO_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
