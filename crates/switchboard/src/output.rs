//! Canonical shape of a tool result.

use patchcord::Content;
use serde::{Deserialize, Serialize};

use crate::error::MediaDecodeError;
use crate::media::{MediaKind, MediaStore};

/// Text inserted ahead of the content of a result flagged `isError`.
pub const TOOL_ERROR_TEXT: &str = "Error executing tool.";

/// A tool result with binary parts replaced by file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub texts: Vec<String>,
    #[serde(rename = "imagePaths")]
    pub image_paths: Vec<String>,
    #[serde(rename = "audioPaths")]
    pub audio_paths: Vec<String>,
    #[serde(rename = "resourceURIs")]
    pub resource_uris: Vec<String>,
}

impl ToolOutput {
    /// Normalize content parts, failing on the first undecodable image or audio.
    pub fn from_contents(contents: &[Content], media: &MediaStore) -> Result<Self, MediaDecodeError> {
        let mut output = ToolOutput::default();
        for item in contents {
            output.push(item, media)?;
        }
        Ok(output)
    }

    /// Like [`ToolOutput::from_contents`], but an undecodable image or audio
    /// part is dropped with a warning instead of failing the whole result.
    pub fn from_contents_lenient(contents: &[Content], media: &MediaStore) -> Self {
        let mut output = ToolOutput::default();
        for item in contents {
            if let Err(e) = output.push(item, media) {
                tracing::warn!(error = %e, "dropping tool output item");
            }
        }
        output
    }

    fn push(&mut self, item: &Content, media: &MediaStore) -> Result<(), MediaDecodeError> {
        match item {
            Content::Text { text } => self.texts.push(text.clone()),
            Content::Image { data, mime_type } => {
                let path = media.write_payload(MediaKind::Image, data, mime_type)?;
                self.image_paths.push(path.display().to_string());
            }
            Content::Audio { data, mime_type } => {
                let path = media.write_payload(MediaKind::Audio, data, mime_type)?;
                self.audio_paths.push(path.display().to_string());
            }
            Content::ResourceLink { uri, .. } => self.resource_uris.push(uri.clone()),
            Content::Resource { resource } => self.resource_uris.push(resource.uri().to_string()),
            Content::Unknown => tracing::debug!("skipping unrecognized content block"),
        }
        Ok(())
    }

    /// Mark the output as coming from a failed tool call.
    pub fn mark_error(&mut self) {
        self.texts.insert(0, TOOL_ERROR_TEXT.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
            && self.image_paths.is_empty()
            && self.audio_paths.is_empty()
            && self.resource_uris.is_empty()
    }

    /// Text handed back to the model as the tool message content.
    pub fn to_model_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.texts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchcord::ResourceContents;

    fn store() -> (tempfile::TempDir, MediaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_error_flag_prepends_text() {
        let (_dir, media) = store();
        let mut output =
            ToolOutput::from_contents(&[Content::text("one"), Content::text("two")], &media).unwrap();
        output.mark_error();

        assert_eq!(output.texts, vec![TOOL_ERROR_TEXT, "one", "two"]);
    }

    #[test]
    fn test_mixed_content_sorted_into_lists() {
        let (_dir, media) = store();
        let contents = vec![
            Content::text("caption"),
            Content::image("iVBORw0KGgo=", "image/png"),
            Content::audio("UklGRg==", "audio/wav"),
            Content::resource_link("file:///report.pdf", "report"),
            Content::Resource {
                resource: ResourceContents::Text {
                    uri: "ui://card".into(),
                    text: "<p/>".into(),
                    mime_type: Some("text/html".into()),
                },
            },
        ];

        let output = ToolOutput::from_contents(&contents, &media).unwrap();

        assert_eq!(output.texts, vec!["caption"]);
        assert_eq!(output.image_paths.len(), 1);
        assert!(output.image_paths[0].ends_with(".png"));
        assert_eq!(output.audio_paths.len(), 1);
        assert!(output.audio_paths[0].ends_with(".wav"));
        assert_eq!(output.resource_uris, vec!["file:///report.pdf", "ui://card"]);
    }

    #[test]
    fn test_unrecognized_block_skipped() {
        let (_dir, media) = store();
        let output =
            ToolOutput::from_contents(&[Content::Unknown, Content::text("kept")], &media).unwrap();

        assert_eq!(output.texts, vec!["kept"]);
        assert!(output.image_paths.is_empty());
        assert!(output.resource_uris.is_empty());
    }

    #[test]
    fn test_strict_fails_on_bad_image() {
        let (_dir, media) = store();
        let err = ToolOutput::from_contents(&[Content::image("not base64!", "image/png")], &media)
            .unwrap_err();
        assert!(matches!(err, MediaDecodeError::InvalidPayload { kind: MediaKind::Image, .. }));
    }

    #[test]
    fn test_lenient_drops_only_bad_items() {
        let (_dir, media) = store();
        let output = ToolOutput::from_contents_lenient(
            &[
                Content::text("kept"),
                Content::audio("AAAA", "audio/x-no-such-type"),
                Content::image("iVBORw0KGgo=", "image/png"),
            ],
            &media,
        );
        assert_eq!(output.texts, vec!["kept"]);
        assert!(output.audio_paths.is_empty());
        assert_eq!(output.image_paths.len(), 1);
    }

    #[test]
    fn test_serialized_keys() {
        let value = serde_json::to_value(ToolOutput::default()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 4);
        for key in ["texts", "imagePaths", "audioPaths", "resourceURIs"] {
            assert!(keys.contains(&key), "missing {key}");
        }
    }
}
