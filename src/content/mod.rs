use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;

use crate::quota::QuotaType;
use crate::utils::format_file_size;
use crate::{ProcessingError, Result};

/// Largest payload accepted for any content type (50 MiB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Largest audio payload accepted (25 MiB)
pub const MAX_AUDIO_SIZE: u64 = 25 * 1024 * 1024;

pub const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/mp4",
    "audio/m4a",
    "audio/x-m4a",
    "audio/ogg",
    "audio/webm",
    "audio/flac",
];

pub const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Broad classification of a content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Audio,
    Image,
    Pdf,
    Unknown,
}

impl ContentKind {
    /// Classify a MIME type, ignoring parameters such as `; charset=...`
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_essence(mime_type);

        if AUDIO_MIME_TYPES.contains(&essence.as_str()) {
            ContentKind::Audio
        } else if IMAGE_MIME_TYPES.contains(&essence.as_str()) {
            ContentKind::Image
        } else if essence == PDF_MIME_TYPE {
            ContentKind::Pdf
        } else {
            ContentKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Audio => "audio",
            ContentKind::Image => "image",
            ContentKind::Pdf => "pdf",
            ContentKind::Unknown => "unknown",
        }
    }

    /// Quota counter charged when this kind of content is processed
    pub fn quota_type(&self) -> Option<QuotaType> {
        match self {
            ContentKind::Audio => Some(QuotaType::AudioMinutes),
            ContentKind::Image => Some(QuotaType::ImageCount),
            ContentKind::Pdf => Some(QuotaType::PdfPages),
            ContentKind::Unknown => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased MIME type without parameters
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Guess a MIME type from a file extension
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" | "aac" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => PDF_MIME_TYPE,
        _ => "application/octet-stream",
    }
}

/// A normalized unit of work: the bytes of one file or fetched URL body
/// together with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUnit {
    name: String,
    mime_type: String,
    kind: ContentKind,
    modified: i64,
    data: Vec<u8>,
}

impl ContentUnit {
    /// Build a unit from raw bytes. `modified` is milliseconds since the epoch.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
        modified: i64,
    ) -> Self {
        let mime_type = mime_essence(&mime_type.into());
        Self {
            name: name.into(),
            kind: ContentKind::from_mime(&mime_type),
            mime_type,
            modified,
            data,
        }
    }

    /// Read a local file, guessing its MIME type from the extension. Files
    /// larger than `max_size` are rejected without being read.
    pub async fn from_path(path: &Path, max_size: u64) -> Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(ProcessingError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }
        if metadata.len() > max_size {
            return Err(ProcessingError::Validation(format!(
                "File size exceeds limit ({} > {})",
                format_file_size(metadata.len()),
                format_file_size(max_size)
            )));
        }

        let modified = metadata
            .modified()
            .ok()
            .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis())
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local-file".to_string());

        let mime_type = path
            .extension()
            .map(|ext| mime_from_extension(&ext.to_string_lossy()))
            .unwrap_or("application/octet-stream");

        let data = tokio::fs::read(path).await?;

        tracing::debug!("Loaded local file {} ({} bytes, {})", name, data.len(), mime_type);

        Ok(Self::new(name, mime_type, data, modified))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Format tag taken from the MIME subtype (`audio/mpeg` -> `mpeg`)
    pub fn format(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .unwrap_or(&self.mime_type)
    }

    /// Cache key built from name, size and modification time
    pub fn fingerprint(&self) -> String {
        format!("{}-{}-{}", self.name, self.size(), self.modified)
    }

    /// Copy a byte range into a new unit carrying the same metadata
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.data.len());
        let start = range.start.min(end);
        Self {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            kind: self.kind,
            modified: self.modified,
            data: self.data[start..end].to_vec(),
        }
    }
}

/// Synthesized audio produced by a speech adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub mime_type: String,

    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl AudioArtifact {
    /// File extension matching the artifact's MIME type
    pub fn extension(&self) -> &'static str {
        match mime_essence(&self.mime_type).as_str() {
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            "audio/mp4" => "m4a",
            _ => "mp3",
        }
    }
}

/// Normalized output of any processing path; the unit written to the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    /// Human-readable transformed text
    pub accessible: String,

    /// Serialized diagnostic metadata (JSON)
    pub analysis: String,

    /// Optional narrated rendering of `accessible`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioArtifact>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mime() {
        assert_eq!(ContentKind::from_mime("audio/mpeg"), ContentKind::Audio);
        assert_eq!(ContentKind::from_mime("Audio/X-WAV"), ContentKind::Audio);
        assert_eq!(ContentKind::from_mime("image/png"), ContentKind::Image);
        assert_eq!(ContentKind::from_mime("application/pdf; qs=0.9"), ContentKind::Pdf);
        assert_eq!(ContentKind::from_mime("text/html"), ContentKind::Unknown);
        assert_eq!(ContentKind::from_mime(""), ContentKind::Unknown);
    }

    #[test]
    fn test_fingerprint() {
        let unit = ContentUnit::new("talk.mp3", "audio/mpeg", vec![0; 42], 1_700_000_000_000);
        assert_eq!(unit.fingerprint(), "talk.mp3-42-1700000000000");
    }

    #[test]
    fn test_slice_preserves_metadata() {
        let unit = ContentUnit::new("talk.mp3", "audio/mpeg", (0u8..10).collect(), 7);
        let slice = unit.slice(4..20);

        assert_eq!(slice.data(), &[4, 5, 6, 7, 8, 9]);
        assert_eq!(slice.name(), "talk.mp3");
        assert_eq!(slice.mime_type(), "audio/mpeg");
        assert_eq!(slice.modified(), 7);
        assert_eq!(slice.kind(), ContentKind::Audio);
    }

    #[test]
    fn test_format_from_mime() {
        let unit = ContentUnit::new("a.wav", "audio/wav", vec![], 0);
        assert_eq!(unit.format(), "wav");
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("MP3"), "audio/mpeg");
        assert_eq!(mime_from_extension("jpg"), "image/jpeg");
        assert_eq!(mime_from_extension("pdf"), "application/pdf");
        assert_eq!(mime_from_extension("exe"), "application/octet-stream");
    }

    #[test]
    fn test_audio_artifact_serializes_as_base64() {
        let result = ServiceResult {
            accessible: "hi".into(),
            analysis: "{}".into(),
            audio: Some(AudioArtifact {
                mime_type: "audio/mpeg".into(),
                data: vec![1, 2, 3],
            }),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["audio"]["data"], "AQID");

        let back: ServiceResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.PNG");
        std::fs::write(&path, b"not really a png").unwrap();

        let unit = ContentUnit::from_path(&path, MAX_FILE_SIZE).await.unwrap();
        assert_eq!(unit.name(), "photo.PNG");
        assert_eq!(unit.kind(), ContentKind::Image);
        assert_eq!(unit.size(), 16);
        assert!(unit.modified() > 0);
    }

    #[tokio::test]
    async fn test_from_path_rejects_oversized_file_unread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.pdf");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_FILE_SIZE + 1).unwrap();

        let err = ContentUnit::from_path(&path, MAX_FILE_SIZE).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
        assert!(err.to_string().contains("File size exceeds limit"));

        // Exactly at the limit is accepted
        file.set_len(1024).unwrap();
        let unit = ContentUnit::from_path(&path, 1024).await.unwrap();
        assert_eq!(unit.size(), 1024);
    }
}
