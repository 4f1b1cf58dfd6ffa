pub mod aggregates;
pub mod balances;
pub mod chain_cursors;
pub mod messages;
pub mod pending_messages;
pub mod pending_txs;
pub mod posts;
pub mod programs;
pub mod stored_files;
