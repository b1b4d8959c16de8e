//! RelayChat session layer.
//!
//! A `ChatSession` owns one connection manager and the message log for one
//! conversation. It reconciles locally submitted messages with frames
//! arriving from the relay and republishes what happened on a session event
//! bus for the presentation layer.

pub mod echo;
pub mod event_bus;
pub mod log;
pub mod session;

pub use echo::EchoFilter;
pub use event_bus::{EventBus, SessionEvent};
pub use log::{ChatEntry, MessageLog, Origin};
pub use session::{ChatSession, SessionOptions};
