//! Push channel of the reference server.

mod handler;
mod hub;

pub use handler::ws_handler;
pub use hub::{ChannelHub, Outgoing};
