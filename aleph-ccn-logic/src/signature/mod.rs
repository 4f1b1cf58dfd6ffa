use crate::types::{Chain, MessageEnvelope};
use thiserror::Error;

mod ed25519;
mod evm;
mod secp256k1;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature is missing")]
    Missing,
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("malformed sender address: {0}")]
    BadAddress(String),
    #[error("signature does not verify")]
    Invalid,
}

/// Verifies that the envelope's signature covers its canonical payload
/// under the chain-appropriate scheme.
pub fn verify(envelope: &MessageEnvelope) -> Result<(), SignatureError> {
    let signature = envelope
        .signature
        .as_deref()
        .ok_or(SignatureError::Missing)?;
    let payload = envelope.verification_buffer();

    match envelope.chain {
        Chain::Eth | Chain::Bnb => evm::verify(&envelope.sender, signature, &payload),
        Chain::Nuls2 => secp256k1::verify_nuls2(signature, &payload),
        Chain::Csdk => secp256k1::verify_adr036(&envelope.sender, signature, &payload),
        Chain::Sol => ed25519::verify_direct(&envelope.sender, signature, &payload),
        // The signature envelope carries the public key for these chains;
        // the address is not re-derived from it.
        Chain::Tezos | Chain::Dot => ed25519::verify_embedded(signature, &payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sha256_hex, ItemType, MessageType};

    pub(super) fn test_envelope(chain: Chain, sender: &str, signature: Option<String>) -> MessageEnvelope {
        MessageEnvelope {
            chain,
            sender: sender.to_string(),
            message_type: MessageType::Post,
            channel: Some("TEST".to_string()),
            time: 1672531200.0,
            item_type: ItemType::Inline,
            item_hash: sha256_hex(b"{}").parse().unwrap(),
            item_content: Some("{}".to_string()),
            signature,
        }
    }

    #[test]
    fn missing_signature_is_an_error() {
        let envelope = test_envelope(Chain::Eth, "0x0000000000000000000000000000000000000000", None);
        assert!(matches!(verify(&envelope), Err(SignatureError::Missing)));
    }
}
