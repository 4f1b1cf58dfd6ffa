pub mod aggregate_elements;
pub mod aggregates;
pub mod balances;
pub mod chain_cursors;
pub mod file_pins;
pub mod message_confirmations;
pub mod messages;
pub mod pending_messages;
pub mod pending_txs;
pub mod posts;
pub mod programs;
pub mod rejected_messages;
pub mod rejected_txs;
pub mod stored_files;
