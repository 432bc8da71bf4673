//! Wire envelope wrapped around every published message.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ad_domain::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub created_at: DateTime<Utc>,
}

impl Default for EnvelopeMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
        }
    }
}

/// Attached to an envelope when its handler failed, before the envelope
/// is parked on the dead-letter stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub failed_at: DateTime<Utc>,
}

impl EnvelopeError {
    pub fn from_error(err: &ad_domain::Error) -> Self {
        // The variant name doubles as the error class on the wire.
        let kind = match err {
            ad_domain::Error::Io(_) => "Io",
            ad_domain::Error::Json(_) => "Json",
            ad_domain::Error::Store(_) => "Store",
            ad_domain::Error::Broker(_) => "Broker",
            ad_domain::Error::Llm(_) => "Llm",
            ad_domain::Error::Notify(_) => "Notify",
            ad_domain::Error::Config(_) => "Config",
            ad_domain::Error::NotFound(_) => "NotFound",
            ad_domain::Error::State(_) => "State",
            ad_domain::Error::Other(_) => "Other",
        };
        Self {
            message: err.to_string(),
            kind: kind.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub metadata: EnvelopeMetadata,
    pub content: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exc_info: Option<EnvelopeError>,
}

impl<T: Serialize + DeserializeOwned> Envelope<T> {
    pub fn new(content: T) -> Self {
        Self {
            metadata: EnvelopeMetadata::default(),
            content,
            exc_info: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMessage {
        task_id: i64,
    }

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(TestMessage { task_id: 42 });
        let json = env.to_json().unwrap();
        let back: Envelope<TestMessage> = Envelope::from_json(&json).unwrap();
        assert_eq!(back.content, TestMessage { task_id: 42 });
        assert!(back.exc_info.is_none());
    }

    #[test]
    fn clean_envelope_omits_exc_info() {
        let env = Envelope::new(TestMessage { task_id: 1 });
        let json = env.to_json().unwrap();
        assert!(!json.contains("exc_info"), "clean envelope leaked exc_info: {json}");
    }

    #[test]
    fn failed_envelope_carries_error_class() {
        let mut env = Envelope::new(TestMessage { task_id: 7 });
        env.exc_info = Some(EnvelopeError::from_error(&ad_domain::Error::Llm(
            "timeout".into(),
        )));
        let json = env.to_json().unwrap();
        assert!(json.contains("\"type\":\"Llm\""));
        assert!(json.contains("LLM: timeout"));

        let back: Envelope<TestMessage> = Envelope::from_json(&json).unwrap();
        assert_eq!(back.exc_info.unwrap().kind, "Llm");
    }

    #[test]
    fn metadata_defaults_when_missing() {
        let back: Envelope<TestMessage> =
            Envelope::from_json(r#"{"content":{"task_id":3}}"#).unwrap();
        assert_eq!(back.content.task_id, 3);
    }
}
