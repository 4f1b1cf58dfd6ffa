use super::SignatureError;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Deserialize;

/// SOL/DOT-style addresses are the base58 public key itself.
pub fn verify_direct(sender: &str, signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
    let key_bytes = bs58::decode(sender)
        .into_vec()
        .map_err(|e| SignatureError::BadAddress(e.to_string()))?;
    verify_raw(&key_bytes, &decode_flex(signature)?, payload)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedSignature {
    public_key: String,
    signature: String,
}

/// Chains whose address is a hash of the key ship the public key inside
/// the signature field as `{"publicKey": ..., "signature": ...}`.
pub fn verify_embedded(signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
    let embedded: EmbeddedSignature =
        serde_json::from_str(signature).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    verify_raw(
        &decode_flex(&embedded.public_key)?,
        &decode_flex(&embedded.signature)?,
        payload,
    )
}

fn verify_raw(key: &[u8], signature: &[u8], payload: &[u8]) -> Result<(), SignatureError> {
    let key: &[u8; 32] = key
        .try_into()
        .map_err(|_| SignatureError::Malformed("ed25519 public key must be 32 bytes".into()))?;
    let signature: &[u8; 64] = signature
        .try_into()
        .map_err(|_| SignatureError::Malformed("ed25519 signature must be 64 bytes".into()))?;

    let key = VerifyingKey::from_bytes(key)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    key.verify_strict(payload, &Signature::from_bytes(signature))
        .map_err(|_| SignatureError::Invalid)
}

/// Signatures and keys arrive hex- or base58-encoded depending on the
/// client library that produced them.
fn decode_flex(value: &str) -> Result<Vec<u8>, SignatureError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    if let Ok(bytes) = hex::decode(stripped) {
        return Ok(bytes);
    }
    bs58::decode(value)
        .into_vec()
        .map_err(|e| SignatureError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        signature::{self, tests::test_envelope},
        types::Chain,
    };
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn solana_round_trip() {
        let key = SigningKey::generate(&mut OsRng);
        let sender = bs58::encode(key.verifying_key().as_bytes()).into_string();

        let mut envelope = test_envelope(Chain::Sol, &sender, None);
        let sig = key.sign(&envelope.verification_buffer());
        envelope.signature = Some(bs58::encode(sig.to_bytes()).into_string());

        signature::verify(&envelope).unwrap();
    }

    #[test]
    fn embedded_round_trip() {
        let key = SigningKey::generate(&mut OsRng);

        let mut envelope = test_envelope(Chain::Tezos, "tz1irrelevant", None);
        let sig = key.sign(&envelope.verification_buffer());
        envelope.signature = Some(
            serde_json::json!({
                "publicKey": hex::encode(key.verifying_key().as_bytes()),
                "signature": hex::encode(sig.to_bytes()),
            })
            .to_string(),
        );

        signature::verify(&envelope).unwrap();
    }

    #[test]
    fn flipped_bit_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let sender = bs58::encode(key.verifying_key().as_bytes()).into_string();

        let mut envelope = test_envelope(Chain::Sol, &sender, None);
        let mut sig = key.sign(&envelope.verification_buffer()).to_bytes();
        sig[0] ^= 1;
        envelope.signature = Some(bs58::encode(sig).into_string());

        assert!(matches!(
            signature::verify(&envelope),
            Err(SignatureError::Invalid)
        ));
    }
}
