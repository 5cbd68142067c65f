//! Minimal STOMP 1.2 client: frame model, codec and a connection task.

pub mod codec;
pub mod connection;
pub mod errors;
pub mod frame;
pub mod subscription;
pub mod tls;

pub use codec::*;
pub use connection::{ConnectOptions, StompConnection};
pub use errors::*;
pub use frame::{Command, Frame, StompItem};
pub use subscription::{AckMode, Message, SubscribeOptions, Subscription};
