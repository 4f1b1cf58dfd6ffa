use super::SignatureError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k256::ecdsa::{signature::DigestVerifier, Signature, VerifyingKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// NULS2 signatures are a hex blob of the 33-byte compressed public key
/// followed by the DER-encoded signature, over sha256 of the payload.
pub fn verify_nuls2(signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
    let blob = hex::decode(signature.strip_prefix("0x").unwrap_or(signature))
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if blob.len() < 34 {
        return Err(SignatureError::Malformed(
            "nuls2 signature blob is too short".into(),
        ));
    }
    let (key, der) = blob.split_at(33);

    let key =
        VerifyingKey::from_sec1_bytes(key).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let signature =
        Signature::from_der(der).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    key.verify_digest(Sha256::new_with_prefix(payload), &signature)
        .map_err(|_| SignatureError::Invalid)
}

#[derive(Deserialize)]
struct CosmosSignature {
    signature: String,
    pub_key: CosmosPubKey,
}

#[derive(Deserialize)]
struct CosmosPubKey {
    value: String,
}

/// Cosmos ADR-036 off-chain signing: the payload is wrapped in a
/// `sign/MsgSignData` sign-doc and signed with secp256k1 over its sha256.
pub fn verify_adr036(sender: &str, signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
    let parsed: CosmosSignature =
        serde_json::from_str(signature).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let key_bytes = BASE64
        .decode(&parsed.pub_key.value)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let sig_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    let doc = sign_doc(sender, payload);
    key.verify_digest(Sha256::new_with_prefix(doc.as_bytes()), &signature)
        .map_err(|_| SignatureError::Invalid)
}

/// The ADR-036 sign-doc with sorted keys and no whitespace, account
/// fields zeroed as the standard mandates for off-chain messages.
fn sign_doc(signer: &str, payload: &[u8]) -> String {
    format!(
        r#"{{"account_number":"0","chain_id":"","fee":{{"amount":[],"gas":"0"}},"memo":"","msgs":[{{"type":"sign/MsgSignData","value":{{"data":"{}","signer":"{}"}}}}],"sequence":"0"}}"#,
        BASE64.encode(payload),
        signer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        signature::{self, tests::test_envelope},
        types::Chain,
    };
    use k256::{
        ecdsa::{signature::DigestSigner, SigningKey},
        elliptic_curve::sec1::ToEncodedPoint,
    };
    use rand::rngs::OsRng;

    #[test]
    fn nuls2_round_trip() {
        let key = SigningKey::random(&mut OsRng);

        let mut envelope = test_envelope(Chain::Nuls2, "NULSd6HgblhWamFNQuQ1Chd2RY6SCYSEv3NZS", None);
        let signature: Signature =
            key.sign_digest(Sha256::new_with_prefix(&envelope.verification_buffer()));

        let mut blob = key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        blob.extend_from_slice(signature.to_der().as_bytes());
        envelope.signature = Some(hex::encode(blob));

        signature::verify(&envelope).unwrap();
    }

    #[test]
    fn adr036_round_trip() {
        let key = SigningKey::random(&mut OsRng);
        let sender = "cosmos1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu";

        let mut envelope = test_envelope(Chain::Csdk, sender, None);
        let doc = sign_doc(sender, &envelope.verification_buffer());
        let signature: Signature = key.sign_digest(Sha256::new_with_prefix(doc.as_bytes()));

        envelope.signature = Some(
            serde_json::json!({
                "signature": BASE64.encode(signature.to_bytes()),
                "pub_key": {
                    "type": "tendermint/PubKeySecp256k1",
                    "value": BASE64.encode(key.verifying_key().to_encoded_point(true).as_bytes()),
                },
            })
            .to_string(),
        );

        signature::verify(&envelope).unwrap();
    }

    #[test]
    fn nuls2_wrong_key_is_rejected() {
        let key = SigningKey::random(&mut OsRng);
        let other = SigningKey::random(&mut OsRng);

        let mut envelope = test_envelope(Chain::Nuls2, "NULSd6HgblhWamFNQuQ1Chd2RY6SCYSEv3NZS", None);
        let signature: Signature =
            key.sign_digest(Sha256::new_with_prefix(&envelope.verification_buffer()));

        let mut blob = other
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        blob.extend_from_slice(signature.to_der().as_bytes());
        envelope.signature = Some(hex::encode(blob));

        assert!(matches!(
            signature::verify(&envelope),
            Err(SignatureError::Invalid)
        ));
    }
}
