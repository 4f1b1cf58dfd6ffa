mod client;
mod inbound;
mod outbound;

pub use client::P2pClient;
pub use inbound::Listener;
pub use outbound::Publisher;
