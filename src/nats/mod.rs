pub mod channel;
pub mod client;
pub mod messages;

pub use channel::{run_command_channel, ChannelConfig};
pub use client::NatsClient;
pub use messages::{HelloMessage, SessionMessage};
