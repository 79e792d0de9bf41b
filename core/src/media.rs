use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Kind of structured payload a response can carry instead of prose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    /// Name of the JSON field holding the base64 payload.
    pub fn payload_field(self) -> &'static str {
        match self {
            Self::Image => "image_base64",
            Self::Audio => "audio_base64",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Audio => "audio/mpeg",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Audio => "mp3",
        }
    }
}

/// A decoded image or audio response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredMedia {
    pub kind: MediaKind,
    pub base64: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl StructuredMedia {
    /// Attempts to read `text` as a media record of the given kind.
    ///
    /// The text must be a JSON object with a non-empty string under the kind's
    /// payload field. Remaining scalar fields become metadata; `null`, arrays and
    /// nested objects are skipped.
    pub fn decode(kind: MediaKind, text: &str) -> Option<Self> {
        let object: Map<String, Value> = match serde_json::from_str(text.trim()) {
            Ok(object) => object,
            Err(err) => {
                tracing::debug!(?kind, %err, "response is not a structured media record");
                return None;
            }
        };

        let field = kind.payload_field();
        let base64 = match object.get(field) {
            Some(Value::String(payload)) if !payload.trim().is_empty() => payload.clone(),
            _ => {
                tracing::debug!(?kind, field, "structured media record has no payload");
                return None;
            }
        };

        let metadata = object
            .iter()
            .filter(|(key, _)| key.as_str() != field)
            .filter_map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null | Value::Array(_) | Value::Object(_) => return None,
                };
                Some((key.clone(), rendered))
            })
            .collect();

        Some(Self {
            kind,
            base64,
            metadata,
        })
    }

    /// Raw bytes of the payload.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = self
            .base64
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD.decode(compact)
    }

    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Response-kind hint values that mark a structured media response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaHints {
    #[serde(default = "MediaHints::default_image")]
    pub image: Vec<String>,
    #[serde(default = "MediaHints::default_audio")]
    pub audio: Vec<String>,
}

impl Default for MediaHints {
    fn default() -> Self {
        Self {
            image: Self::default_image(),
            audio: Self::default_audio(),
        }
    }
}

impl MediaHints {
    fn default_image() -> Vec<String> {
        vec!["stability".to_string()]
    }

    fn default_audio() -> Vec<String> {
        vec!["elevenlabs".to_string()]
    }

    /// Media kind named by a response-kind hint, if any. Matching ignores ASCII case.
    pub fn classify(&self, response_kind: &str) -> Option<MediaKind> {
        let hint = response_kind.trim();
        if self.image.iter().any(|h| h.eq_ignore_ascii_case(hint)) {
            Some(MediaKind::Image)
        } else if self.audio.iter().any(|h| h.eq_ignore_ascii_case(hint)) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}
