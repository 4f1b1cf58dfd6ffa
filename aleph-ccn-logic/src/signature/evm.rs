use super::SignatureError;
use ethers::types::{Address, Signature};
use std::str::FromStr;

/// EIP-191 personal-message verification: recover the signer from the
/// 65-byte r||s||v signature and compare with the declared sender.
pub fn verify(sender: &str, signature: &str, payload: &[u8]) -> Result<(), SignatureError> {
    let address =
        Address::from_str(sender).map_err(|e| SignatureError::BadAddress(e.to_string()))?;
    let signature =
        Signature::from_str(signature).map_err(|e| SignatureError::Malformed(e.to_string()))?;

    signature
        .verify(payload.to_vec(), address)
        .map_err(|_| SignatureError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        signature::{self, tests::test_envelope},
        types::Chain,
    };
    use ethers::signers::{LocalWallet, Signer};

    #[tokio::test]
    async fn round_trip() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let sender = format!("{:?}", wallet.address());

        let mut envelope = test_envelope(Chain::Eth, &sender, None);
        let signed = wallet
            .sign_message(envelope.verification_buffer())
            .await
            .unwrap();
        envelope.signature = Some(format!("0x{signed}"));

        signature::verify(&envelope).unwrap();
    }

    #[tokio::test]
    async fn wrong_sender_is_rejected() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let other = LocalWallet::new(&mut rand::thread_rng());
        let sender = format!("{:?}", other.address());

        let mut envelope = test_envelope(Chain::Eth, &sender, None);
        let signed = wallet
            .sign_message(envelope.verification_buffer())
            .await
            .unwrap();
        envelope.signature = Some(format!("0x{signed}"));

        assert!(matches!(
            signature::verify(&envelope),
            Err(SignatureError::Invalid)
        ));
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let sender = format!("{:?}", wallet.address());

        let mut envelope = test_envelope(Chain::Eth, &sender, None);
        let signed = wallet.sign_message(b"something else".to_vec()).await.unwrap();
        envelope.signature = Some(format!("0x{signed}"));

        assert!(signature::verify(&envelope).is_err());
    }
}
