use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemHashKind {
    /// Lowercase hex sha-256, used for inline and local-storage content.
    Sha256,
    /// Base58 CIDv0 (`Qm...`), used for IPFS content.
    Cid,
}

/// A validated content address. The network accepts exactly two encodings,
/// so anything else is rejected at the deserialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemHash(String);

impl ItemHash {
    pub fn kind(&self) -> ItemHashKind {
        if self.0.len() == 64 {
            ItemHashKind::Sha256
        } else {
            ItemHashKind::Cid
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() == 64 && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Ok(ItemHash(value));
        }
        if value.starts_with("Qm") && Cid::try_from(value.as_str()).is_ok() {
            return Ok(ItemHash(value));
        }
        Err(format!("not a sha-256 hex digest or CIDv0: {value}"))
    }
}

impl std::str::FromStr for ItemHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemHash::try_from(s.to_string())
    }
}

impl From<ItemHash> for String {
    fn from(value: ItemHash) -> Self {
        value.0
    }
}

impl fmt::Display for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// CIDv0 of a raw block. The node pins whole blocks, so no chunking or
/// dag-pb envelope is applied before hashing.
pub fn cid_v0(bytes: &[u8]) -> String {
    let multihash = Code::Sha2_256.digest(bytes);
    Cid::new_v0(multihash)
        .expect("sha2-256 multihash is always a valid CIDv0")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase() {
        let digest = sha256_hex(b"hello");
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn cid_v0_matches_known_vector() {
        // `ipfs block put` of the empty block
        let cid = cid_v0(b"");
        assert_eq!(cid, "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH");
    }

    #[test]
    fn item_hash_accepts_both_encodings() {
        let hex: ItemHash = sha256_hex(b"x").parse().unwrap();
        assert_eq!(hex.kind(), ItemHashKind::Sha256);

        let cid: ItemHash = "QmbFMke1KXqnYyBBWxB74N4c5SBnJMVAiMNRcGu6x1AwQH"
            .parse()
            .unwrap();
        assert_eq!(cid.kind(), ItemHashKind::Cid);
    }

    #[test]
    fn item_hash_rejects_garbage() {
        assert!("deadbeef".parse::<ItemHash>().is_err());
        assert!("QmnotArealCid".parse::<ItemHash>().is_err());
        assert!(ItemHash::try_from(sha256_hex(b"x").to_uppercase()).is_err());
    }
}
