//! Event delivery between the server and connected clients.
//!
//! The transport only moves small events, so the hub splits anything larger
//! into ordered fragments and the receiving side stitches them back together
//! before listeners see them.

pub mod chunk;
pub mod endpoints;
pub mod hub;
pub mod presence;
pub mod transport;

pub use endpoints::*;
pub use hub::{Binding, Listener, RealtimeHub};
