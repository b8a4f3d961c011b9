pub mod broker;
pub mod client;
pub mod connector;
pub mod errors;
pub mod exchange;
pub mod listener;
pub mod message;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod queue;
pub mod tls;

pub use connector::{Connector, ConnectorEvents};
pub use message::TaggedMessage;
