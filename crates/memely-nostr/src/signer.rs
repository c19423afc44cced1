//! External signer boundary
//!
//! Signing is a capability injected by the surrounding application: a
//! local-key signer or an external signing app. The client computes the
//! event id itself before delegating, because external signers expect a
//! pre-populated id. Signers return either a complete signed-event JSON
//! document or a bare hex signature; both shapes are accepted.

use crate::event::{event_id, Event, UnsignedEvent};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the signing boundary. These propagate to the publish caller
/// as hard failures; an unsigned event is never broadcast.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signer failed: {0}")]
    Failed(String),

    #[error("invalid signer response: {0}")]
    InvalidResponse(String),

    #[error("signed event id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: String, got: String },

    #[error("event error: {0}")]
    Event(#[from] crate::event::EventError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The two response shapes signers produce.
#[derive(Debug, Clone)]
pub enum SignerResponse {
    /// A complete signed-event JSON document.
    SignedEvent(String),
    /// A bare 64-byte hex signature.
    Signature(String),
}

impl SignerResponse {
    /// Classify a raw signer reply by shape: JSON objects are treated as
    /// full signed events, anything else as a bare signature.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim_start().starts_with('{') {
            SignerResponse::SignedEvent(raw.to_string())
        } else {
            SignerResponse::Signature(raw.trim().to_string())
        }
    }
}

/// Injected signing capability.
#[async_trait]
pub trait EventSigner: Send + Sync {
    /// Hex public key the signer signs as.
    fn public_key(&self) -> String;

    /// Sign the given unsigned event. `event_id` is the precomputed
    /// canonical id, for signers that expect a pre-populated id field.
    async fn sign(
        &self,
        event: &UnsignedEvent,
        event_id: &str,
    ) -> Result<SignerResponse, SignerError>;
}

/// Assemble the final signed event from an unsigned event and a signer
/// response, computing and checking the id locally.
pub fn complete_event(
    unsigned: &UnsignedEvent,
    response: SignerResponse,
) -> Result<Event, SignerError> {
    let expected_id = event_id(unsigned)?;

    match response {
        SignerResponse::SignedEvent(json) => {
            let event: Event = serde_json::from_str(&json)?;
            if event.id != expected_id {
                return Err(SignerError::IdMismatch {
                    expected: expected_id,
                    got: event.id,
                });
            }
            if !is_hex_signature(&event.sig) {
                return Err(SignerError::InvalidResponse(
                    "signature is not 128 hex characters".to_string(),
                ));
            }
            Ok(event)
        }
        SignerResponse::Signature(sig) => {
            if !is_hex_signature(&sig) {
                return Err(SignerError::InvalidResponse(
                    "signature is not 128 hex characters".to_string(),
                ));
            }
            Ok(Event {
                id: expected_id,
                pubkey: unsigned.pubkey.clone(),
                created_at: unsigned.created_at,
                kind: unsigned.kind,
                tags: unsigned.tags.clone(),
                content: unsigned.content.clone(),
                sig,
            })
        }
    }
}

fn is_hex_signature(sig: &str) -> bool {
    sig.len() == 128 && sig.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KIND_TEXT_NOTE;

    fn unsigned() -> UnsignedEvent {
        UnsignedEvent {
            pubkey: "a".repeat(64),
            created_at: 1_700_000_000,
            kind: KIND_TEXT_NOTE,
            tags: vec![],
            content: "meme".to_string(),
        }
    }

    #[test]
    fn test_from_raw_classifies_shapes() {
        assert!(matches!(
            SignerResponse::from_raw(r#"{"id":"x"}"#),
            SignerResponse::SignedEvent(_)
        ));
        assert!(matches!(
            SignerResponse::from_raw(&"ab".repeat(64)),
            SignerResponse::Signature(_)
        ));
    }

    #[test]
    fn test_complete_from_bare_signature() {
        let sig = "ab".repeat(64);
        let event = complete_event(&unsigned(), SignerResponse::Signature(sig.clone())).unwrap();

        assert_eq!(event.id, event_id(&unsigned()).unwrap());
        assert_eq!(event.sig, sig);
        assert_eq!(event.content, "meme");
    }

    #[test]
    fn test_complete_from_signed_event_json() {
        let unsigned = unsigned();
        let id = event_id(&unsigned).unwrap();
        let json = serde_json::json!({
            "id": id,
            "pubkey": unsigned.pubkey,
            "created_at": unsigned.created_at,
            "kind": unsigned.kind,
            "tags": unsigned.tags,
            "content": unsigned.content,
            "sig": "cd".repeat(64),
        })
        .to_string();

        let event = complete_event(&unsigned, SignerResponse::SignedEvent(json)).unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.sig, "cd".repeat(64));
    }

    #[test]
    fn test_complete_rejects_id_mismatch() {
        let unsigned = unsigned();
        let json = serde_json::json!({
            "id": "f".repeat(64),
            "pubkey": unsigned.pubkey,
            "created_at": unsigned.created_at,
            "kind": unsigned.kind,
            "tags": unsigned.tags,
            "content": unsigned.content,
            "sig": "cd".repeat(64),
        })
        .to_string();

        assert!(matches!(
            complete_event(&unsigned, SignerResponse::SignedEvent(json)),
            Err(SignerError::IdMismatch { .. })
        ));
    }

    #[test]
    fn test_complete_rejects_bad_signature() {
        assert!(matches!(
            complete_event(&unsigned(), SignerResponse::Signature("short".to_string())),
            Err(SignerError::InvalidResponse(_))
        ));
    }
}
