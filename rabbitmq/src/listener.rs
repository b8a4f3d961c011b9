use crate::{
    broker::{BrokerConnection, DeliveryStream, Session},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    message::normalize,
    queue::{QueueBinding, QueueDefinition},
};
use configs::EventBinding;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Hand-off between the consume loop and whoever drains [`ListenerOutput`].
struct Envelope {
    body: Vec<u8>,
    forwarded: oneshot::Sender<()>,
}

/// Confirms that a body left the listener's hands. The delivery is acknowledged only
/// once this is confirmed; dropping it leaves the delivery unacknowledged.
pub struct Receipt(oneshot::Sender<()>);

impl Receipt {
    pub fn confirm(self) {
        let _ = self.0.send(());
    }
}

/// Private output stream of one listener. Closed when its subscription ends.
pub struct ListenerOutput {
    rx: mpsc::Receiver<Envelope>,
}

impl ListenerOutput {
    pub async fn recv(&mut self) -> Option<(Vec<u8>, Receipt)> {
        let envelope = self.rx.recv().await?;
        Some((envelope.body, Receipt(envelope.forwarded)))
    }
}

/// Owns one exchange/queue binding on a single connection generation.
pub struct Listener {
    kind: String,
    exchange: ExchangeDefinition,
    queue: QueueDefinition,
    consuming: bool,
    conn: Arc<dyn BrokerConnection>,
    output: Mutex<Option<mpsc::Sender<Envelope>>>,
}

impl Listener {
    pub fn new(
        binding: &EventBinding,
        conn: Arc<dyn BrokerConnection>,
    ) -> (Listener, ListenerOutput) {
        // Capacity one keeps the consume loop in lockstep with the forwarder.
        let (tx, rx) = mpsc::channel(1);

        let listener = Listener {
            kind: binding.kind.clone(),
            exchange: ExchangeDefinition::new(&binding.exchange).durable(),
            queue: QueueDefinition::new(&binding.queue).durable(),
            consuming: binding.consuming,
            conn,
            output: Mutex::new(Some(tx)),
        };

        (listener, ListenerOutput { rx })
    }

    pub fn consuming(&self) -> bool {
        self.consuming
    }

    /// Declares the exchange and, when `consume` is set, declares and binds the queue
    /// and consumes it until the delivery stream ends. Failures are logged and end
    /// the subscription; the output stream is closed on every exit path.
    pub async fn subscribe(&self, consume: bool) {
        info!(
            exchange = self.exchange.name(),
            queue = self.queue.name(),
            "subscribing"
        );

        let Some(output) = self.output.lock().await.take() else {
            error!(
                exchange = self.exchange.name(),
                queue = self.queue.name(),
                "listener was already subscribed"
            );
            return;
        };

        if !self.has_connection() {
            error!(
                exchange = self.exchange.name(),
                queue = self.queue.name(),
                "subscribing is failed, rabbitmq connection is closed"
            );
            return;
        }

        let session = match self.conn.open_session().await {
            Ok(session) => session,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange = self.exchange.name(),
                    queue = self.queue.name(),
                    "could not open rabbitmq channel"
                );
                return;
            }
        };

        match self.prepare(session.as_ref(), consume).await {
            Ok(Some(deliveries)) => self.consume(deliveries, output).await,
            Ok(None) => debug!(exchange = self.exchange.name(), "declare-only binding"),
            Err(err) => error!(
                error = err.to_string(),
                exchange = self.exchange.name(),
                queue = self.queue.name(),
                "subscribing is failed"
            ),
        }

        self.release(session).await;
    }

    /// Publishes `body` to this listener's exchange on a short-lived channel.
    pub async fn publish(&self, body: &[u8], content_type: &str) -> bool {
        match self.try_publish(body, content_type).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange = self.exchange.name(),
                    "an error occurred while publishing"
                );
                false
            }
        }
    }

    /// Usable iff the connection is present and not closed.
    fn has_connection(&self) -> bool {
        !self.conn.is_closed()
    }

    async fn prepare(
        &self,
        session: &dyn Session,
        consume: bool,
    ) -> Result<Option<DeliveryStream>, AmqpError> {
        session.declare_exchange(&self.exchange).await?;

        if !consume {
            return Ok(None);
        }

        session.declare_queue(&self.queue).await?;
        session
            .bind_queue(
                &QueueBinding::new(self.queue.name())
                    .exchange(self.exchange.name())
                    .routing_key(""),
            )
            .await?;

        let tag = format!("{}-{}", self.kind, Uuid::new_v4());
        let deliveries = session.consume(self.queue.name(), &tag).await?;

        info!(
            exchange = self.exchange.name(),
            queue = self.queue.name(),
            "subscribed"
        );

        Ok(Some(deliveries))
    }

    async fn consume(&self, mut deliveries: DeliveryStream, output: mpsc::Sender<Envelope>) {
        let closed = self.conn.closed();
        tokio::pin!(closed);

        loop {
            let result = tokio::select! {
                next = deliveries.next() => match next {
                    Some(result) => result,
                    None => break,
                },
                _ = &mut closed => {
                    warn!(queue = self.queue.name(), "connection is gone, stop consuming");
                    return;
                }
            };

            let mut delivery = match result {
                Ok(delivery) => delivery,
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        queue = self.queue.name(),
                        "errors consume msg"
                    );
                    continue;
                }
            };

            let body = normalize(std::mem::take(&mut delivery.data));
            debug!(
                queue = self.queue.name(),
                "incoming message: {}",
                String::from_utf8_lossy(&body)
            );

            let (forwarded, confirmation) = oneshot::channel();
            if output.send(Envelope { body, forwarded }).await.is_err() {
                warn!(queue = self.queue.name(), "output stream is closed, stop consuming");
                return;
            }

            if confirmation.await.is_err() {
                warn!(
                    queue = self.queue.name(),
                    "message was not forwarded, leaving it unacknowledged"
                );
                return;
            }

            if let Err(err) = delivery.ack().await {
                error!(
                    error = err.to_string(),
                    queue = self.queue.name(),
                    "error whiling ack msg"
                );
            }
        }

        warn!(queue = self.queue.name(), "delivery channel is closed");
    }

    async fn try_publish(&self, body: &[u8], content_type: &str) -> Result<(), AmqpError> {
        if !self.has_connection() {
            return Err(AmqpError::ConnectionClosedError);
        }

        debug!(
            exchange = self.exchange.name(),
            "publishing message: {}",
            String::from_utf8_lossy(body)
        );

        let session = self.conn.open_session().await?;

        let published = match session.declare_exchange(&self.exchange).await {
            Ok(()) => {
                session
                    .publish(self.exchange.name(), "", body, content_type)
                    .await
            }
            Err(err) => Err(err),
        };

        self.release(session).await;

        published
    }

    async fn release(&self, session: Box<dyn Session>) {
        if let Err(err) = session.close().await {
            debug!(
                error = err.to_string(),
                exchange = self.exchange.name(),
                "closing channel error"
            );
        }
    }
}
