use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    tls::TlsSettings,
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
#[cfg(any(test, feature = "mocks"))]
use mockall::automock;
use std::{fmt::Display, sync::Arc};

/// Stream of deliveries for one consumer. Ends when the broker cancels the consumer
/// or the underlying channel goes away.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// Broker-reported reason for a connection-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: Option<u16>, reason: &str) -> CloseReason {
        CloseReason {
            code,
            reason: reason.to_owned(),
        }
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[CODE][{}] [REASON][{}]", code, self.reason),
            None => write!(f, "[REASON][{}]", self.reason),
        }
    }
}

#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), AmqpError>;
}

pub struct Delivery {
    pub data: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(data: Vec<u8>, acker: Box<dyn Acker>) -> Delivery {
        Delivery { data, acker }
    }

    /// Acknowledges this single delivery.
    pub async fn ack(&self) -> Result<(), AmqpError> {
        self.acker.ack().await
    }
}

/// Dials the broker. One call produces one independent connection.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn dial(
        &self,
        uri: &str,
        tls: Option<TlsSettings>,
    ) -> Result<Arc<dyn BrokerConnection>, AmqpError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn is_closed(&self) -> bool;

    async fn open_session(&self) -> Result<Box<dyn Session>, AmqpError>;

    /// Resolves once the connection stops being usable: `None` for an intentional
    /// close, `Some` for a failure reported by the broker or the transport.
    async fn closed(&self) -> Option<CloseReason>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// A channel scoped to one listener or one publish.
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait Session: Send + Sync {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;
    async fn consume(&self, queue: &str, tag: &str) -> Result<DeliveryStream, AmqpError>;
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AmqpError>;
    async fn close(&self) -> Result<(), AmqpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_format_close_reason() {
        let reason = CloseReason::new(Some(320), "CONNECTION_FORCED");
        assert_eq!(reason.to_string(), "[CODE][320] [REASON][CONNECTION_FORCED]");

        let reason = CloseReason::new(None, "io error");
        assert_eq!(reason.to_string(), "[REASON][io error]");
    }
}
