pub mod content;
pub mod envelope;
pub mod hash;

pub use content::MessageContent;
pub use envelope::MessageEnvelope;
pub use hash::{cid_v0, sha256_hex, ItemHash, ItemHashKind};

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Chains the network accepts signed messages from. Only a subset carries
/// an on-chain sync log (see `chains`); the rest are signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "BNB")]
    Bnb,
    #[serde(rename = "NULS2")]
    Nuls2,
    #[serde(rename = "TEZOS")]
    Tezos,
    #[serde(rename = "CSDK")]
    Csdk,
    #[serde(rename = "SOL")]
    Sol,
    #[serde(rename = "DOT")]
    Dot,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bnb => "BNB",
            Chain::Nuls2 => "NULS2",
            Chain::Tezos => "TEZOS",
            Chain::Csdk => "CSDK",
            Chain::Sol => "SOL",
            Chain::Dot => "DOT",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ETH" => Ok(Chain::Eth),
            "BNB" => Ok(Chain::Bnb),
            "NULS2" => Ok(Chain::Nuls2),
            "TEZOS" => Ok(Chain::Tezos),
            "CSDK" => Ok(Chain::Csdk),
            "SOL" => Ok(Chain::Sol),
            "DOT" => Ok(Chain::Dot),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Aggregate,
    Post,
    Store,
    Forget,
    Program,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Aggregate,
        MessageType::Post,
        MessageType::Store,
        MessageType::Forget,
        MessageType::Program,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Aggregate => "AGGREGATE",
            MessageType::Post => "POST",
            MessageType::Store => "STORE",
            MessageType::Forget => "FORGET",
            MessageType::Program => "PROGRAM",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AGGREGATE" => Ok(MessageType::Aggregate),
            "POST" => Ok(MessageType::Post),
            "STORE" => Ok(MessageType::Store),
            "FORGET" => Ok(MessageType::Forget),
            "PROGRAM" => Ok(MessageType::Program),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Where the message payload lives: in the envelope itself, in the local
/// object store, or on IPFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Inline,
    Storage,
    Ipfs,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Inline => "inline",
            ItemType::Storage => "storage",
            ItemType::Ipfs => "ipfs",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inline" => Ok(ItemType::Inline),
            "storage" => Ok(ItemType::Storage),
            "ipfs" => Ok(ItemType::Ipfs),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Onchain,
    P2p,
    Http,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Onchain => "onchain",
            Origin::P2p => "p2p",
            Origin::Http => "http",
        }
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onchain" => Ok(Origin::Onchain),
            "p2p" => Ok(Origin::P2p),
            "http" => Ok(Origin::Http),
            other => Err(format!("unknown origin: {other}")),
        }
    }
}

/// How an on-chain sync transaction carries its message batch: inline
/// JSON or a CAS reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxProtocol {
    BatchInline,
    BatchRef,
}

impl TxProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxProtocol::BatchInline => "batch_inline",
            TxProtocol::BatchRef => "batch_ref",
        }
    }
}

impl FromStr for TxProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch_inline" => Ok(TxProtocol::BatchInline),
            "batch_ref" => Ok(TxProtocol::BatchRef),
            other => Err(format!("unknown tx protocol: {other}")),
        }
    }
}

/// Proof that a message was ordered on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Confirmation {
    pub chain: Chain,
    pub height: u64,
    pub tx_hash: String,
}
