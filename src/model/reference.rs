use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Models the server downloads on a fresh install, in prefetch order.
pub const DEFAULT_MODELS: &[&str] = &[
    "speaches-ai/Kokoro-82M-v1.0-ONNX",
    "Systran/faster-whisper-large-v3",
];

/// An `org/name` identifier accepted by the server's model registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    id: String,
    split: usize,
}

impl ModelId {
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidModelId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let id = id.trim();
        let (org, name) = id
            .split_once('/')
            .ok_or_else(|| invalid("expected <org>/<name>"))?;

        if name.contains('/') {
            return Err(invalid("expected exactly one '/'"));
        }

        for (label, part) in [("organization", org), ("model name", name)] {
            if part.is_empty() {
                return Err(invalid(&format!("{} is empty", label)));
            }
            if part == "." || part == ".." {
                return Err(invalid(&format!("{} cannot be '{}'", label, part)));
            }
            if let Some(c) = part
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            {
                return Err(invalid(&format!("{} contains '{}'", label, c)));
            }
        }

        Ok(Self {
            id: id.to_string(),
            split: org.len(),
        })
    }

    pub fn defaults() -> Vec<ModelId> {
        DEFAULT_MODELS
            .iter()
            .map(|id| ModelId::parse(id).expect("default model ids are well-formed"))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn org(&self) -> &str {
        &self.id[..self.split]
    }

    pub fn name(&self) -> &str {
        &self.id[self.split + 1..]
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl FromStr for ModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ModelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ModelId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_org_and_name() {
        let id = ModelId::parse("Systran/faster-whisper-large-v3").unwrap();
        assert_eq!(id.org(), "Systran");
        assert_eq!(id.name(), "faster-whisper-large-v3");
        assert_eq!(id.to_string(), "Systran/faster-whisper-large-v3");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let id: ModelId = "  speaches-ai/Kokoro-82M-v1.0-ONNX\n".parse().unwrap();
        assert_eq!(id.as_str(), "speaches-ai/Kokoro-82M-v1.0-ONNX");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "",
            "no-slash",
            "/name",
            "org/",
            "a/b/c",
            "../etc",
            "org/..",
            "org/na me",
            "org/name?x=1",
            "org/name#frag",
        ] {
            assert!(
                matches!(ModelId::parse(bad), Err(Error::InvalidModelId { .. })),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn defaults_are_ordered() {
        let defaults = ModelId::defaults();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults[0].as_str(), "speaches-ai/Kokoro-82M-v1.0-ONNX");
        assert_eq!(defaults[1].as_str(), "Systran/faster-whisper-large-v3");
    }

    #[test]
    fn deserializes_with_validation() {
        let ids: Vec<ModelId> = serde_json::from_str(r#"["a/b", "c/d"]"#).unwrap();
        assert_eq!(ids[1].org(), "c");
        assert!(serde_json::from_str::<Vec<ModelId>>(r#"["bad"]"#).is_err());
    }
}
