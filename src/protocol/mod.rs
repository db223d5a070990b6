//! Wire protocol (§4.5/§6): length-prefixed framing, the `Message` schema,
//! and the server/client finite state machines built on top of them.

pub mod client;
pub mod framing;
pub mod message;
pub mod server;

pub use client::Client;
pub use message::Message;
pub use server::Session;
