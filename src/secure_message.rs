// src/secure_message.rs
// The encrypted message envelope and its wire form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::{Nonce, PublicKey};
use crate::errors::{MessengerError, Result};

/// Poly1305 tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// An authenticated ciphertext together with everything the recipient needs
/// to open it. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub struct EncryptedMessage {
    ciphertext: Vec<u8>,
    nonce: Nonce,
    sender_public_key: PublicKey,
}

/// The flat record carried by the message relay: three base64 strings and
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WireEnvelope {
    pub ciphertext: String,
    pub nonce: String,
    pub sender_public_key: String,
}

impl EncryptedMessage {
    /// Reassemble an envelope received from the transport.
    pub fn from_parts(ciphertext: Vec<u8>, nonce: Nonce, sender_public_key: PublicKey) -> Self {
        EncryptedMessage {
            ciphertext,
            nonce,
            sender_public_key,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn sender_public_key(&self) -> &PublicKey {
        &self.sender_public_key
    }

    pub fn to_wire(&self) -> WireEnvelope {
        WireEnvelope {
            ciphertext: STANDARD.encode(&self.ciphertext),
            nonce: STANDARD.encode(self.nonce.as_bytes()),
            sender_public_key: STANDARD.encode(self.sender_public_key.as_bytes()),
        }
    }

    pub fn from_wire(wire: &WireEnvelope) -> Result<Self> {
        let ciphertext = decode_field("ciphertext", &wire.ciphertext)?;
        if ciphertext.len() < TAG_LEN {
            return Err(MessengerError::MalformedEnvelope(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&decode_field("nonce", &wire.nonce)?)
            .map_err(|e| MessengerError::MalformedEnvelope(format!("nonce: {e}")))?;
        let sender_public_key = PublicKey::from_slice(&decode_field("senderPublicKey", &wire.sender_public_key)?)
            .map_err(|e| MessengerError::MalformedEnvelope(format!("senderPublicKey: {e}")))?;

        Ok(EncryptedMessage {
            ciphertext,
            nonce,
            sender_public_key,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.to_wire())
            .map_err(|e| MessengerError::MalformedEnvelope(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireEnvelope =
            serde_json::from_str(json).map_err(|e| MessengerError::MalformedEnvelope(e.to_string()))?;
        Self::from_wire(&wire)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| MessengerError::MalformedEnvelope(format!("{name}: {e}")))
}

impl From<EncryptedMessage> for WireEnvelope {
    fn from(message: EncryptedMessage) -> Self {
        message.to_wire()
    }
}

impl TryFrom<WireEnvelope> for EncryptedMessage {
    type Error = MessengerError;

    fn try_from(wire: WireEnvelope) -> Result<Self> {
        EncryptedMessage::from_wire(&wire)
    }
}
