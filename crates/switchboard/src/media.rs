//! Addressable storage for binary tool payloads.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use patchcord::ResourceContents;

use crate::error::MediaDecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Preferred extensions where `mime_guess` would pick an obscure one first.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/heic", "heic"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/flac", "flac"),
    ("audio/aac", "aac"),
    ("audio/mp4", "m4a"),
    ("audio/webm", "weba"),
    ("text/html", "html"),
    ("text/html+skybridge", "html"),
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/csv", "csv"),
    ("application/json", "json"),
    ("application/pdf", "pdf"),
];

/// File extension for a media type, ignoring parameters like `charset`.
pub fn extension_for(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.is_empty() {
        return None;
    }

    PREFERRED_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied())
        })
}

/// Writes decoded payloads under one directory with collision-free names.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<tmp>/switchboard-media`
    pub fn temporary() -> Self {
        Self::new(std::env::temp_dir().join("switchboard-media"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode a base64 payload and write it as `<uuid>.<ext>`.
    pub fn write_payload(
        &self,
        kind: MediaKind,
        data: &str,
        mime_type: &str,
    ) -> Result<PathBuf, MediaDecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|source| MediaDecodeError::InvalidPayload { kind, source })?;

        let ext = extension_for(mime_type).ok_or_else(|| MediaDecodeError::UnknownMediaType {
            kind,
            mime_type: mime_type.to_string(),
        })?;

        let path = self.dir.join(format!("{}.{}", uuid::Uuid::new_v4(), ext));
        self.write(&path, &bytes)?;

        tracing::debug!(%kind, path = %path.display(), bytes = bytes.len(), "payload written");
        Ok(path)
    }

    /// Persist resource contents as `<uri>.<ext>`.
    ///
    /// Items without a known media type, or with an undecodable blob, are
    /// skipped.
    pub fn save_resource_contents(
        &self,
        contents: &[ResourceContents],
    ) -> Result<Vec<PathBuf>, MediaDecodeError> {
        let mut saved = Vec::new();

        for item in contents {
            let Some(ext) = item.mime_type().and_then(extension_for) else {
                tracing::debug!(uri = item.uri(), "no extension for resource, skipping");
                continue;
            };

            let bytes = match item {
                ResourceContents::Text { text, .. } => text.as_bytes().to_vec(),
                ResourceContents::Blob { blob, .. } => {
                    match base64::engine::general_purpose::STANDARD.decode(blob.trim()) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!(uri = item.uri(), error = %e, "undecodable blob, skipping");
                            continue;
                        }
                    }
                }
            };

            let path = self.dir.join(format!("{}.{}", file_stem_for(item.uri()), ext));
            self.write(&path, &bytes)?;
            saved.push(path);
        }

        Ok(saved)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), MediaDecodeError> {
        std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(path, bytes))
            .map_err(|source| MediaDecodeError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Filesystem-safe stem derived from a resource URI or any other name.
pub fn file_stem_for(uri: &str) -> String {
    let stem: String = uri
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    if stem.is_empty() {
        "resource".to_string()
    } else {
        stem.chars().take(120).collect()
    }
}
