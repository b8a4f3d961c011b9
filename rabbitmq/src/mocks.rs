//! In-memory broker double. Records every operation so lifecycle tests can assert on
//! ordering, and lets tests inject deliveries and connection failures.

use crate::{
    broker::{Acker, Broker, BrokerConnection, CloseReason, Delivery, DeliveryStream, Session},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    tls::TlsSettings,
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Dialed { uri: String, tls: bool },
    DialFailed,
    ExchangeDeclared(String),
    QueueDeclared(String),
    QueueBound { queue: String, exchange: String },
    Consumed(String),
    Published { exchange: String, body: Vec<u8>, content_type: String },
    Acked { queue: String, body: Vec<u8> },
    SessionClosed,
    ConnectionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Open,
    Closed,
    Failed(CloseReason),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Shared {
    events: Vec<BrokerEvent>,
    dial_times: Vec<Instant>,
    dial_failures: usize,
    rejected_exchanges: HashSet<String>,
    connections: Vec<Arc<FakeConnection>>,
}

#[derive(Clone, Default)]
pub struct FakeBroker {
    shared: Arc<Mutex<Shared>>,
}

impl FakeBroker {
    pub fn new() -> FakeBroker {
        FakeBroker::default()
    }

    /// Makes the next `count` dials fail.
    pub fn fail_next_dials(&self, count: usize) {
        lock(&self.shared).dial_failures = count;
    }

    /// Makes every declare of `exchange` fail.
    pub fn reject_exchange(&self, exchange: &str) {
        lock(&self.shared).rejected_exchanges.insert(exchange.to_owned());
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        lock(&self.shared).events.clone()
    }

    pub fn dial_times(&self) -> Vec<Instant> {
        lock(&self.shared).dial_times.clone()
    }

    pub fn connections(&self) -> usize {
        lock(&self.shared).connections.len()
    }

    /// Connections that reached a terminal state, intentionally or not.
    pub fn closed_connections(&self) -> usize {
        lock(&self.shared)
            .connections
            .iter()
            .filter(|conn| conn.is_closed())
            .count()
    }

    pub fn acked(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BrokerEvent::Acked { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Live consumers on the newest connection.
    pub fn consumers(&self) -> usize {
        match self.current() {
            Some(conn) => {
                let consumers = lock(&conn.consumers);
                consumers.len()
            }
            None => 0,
        }
    }

    /// Pushes a delivery onto `queue`, waiting for a consumer to attach to it first.
    pub async fn deliver(&self, queue: &str, body: &[u8]) {
        loop {
            let consumer = match self.current() {
                Some(conn) => {
                    let consumers = lock(&conn.consumers);
                    consumers.get(queue).cloned()
                }
                None => None,
            };

            if let Some(consumer) = consumer {
                let acker = FakeAcker {
                    queue: queue.to_owned(),
                    body: body.to_vec(),
                    shared: self.shared.clone(),
                };
                if consumer
                    .send(Delivery::new(body.to_vec(), Box::new(acker)))
                    .is_ok()
                {
                    return;
                }
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Holds on to the consumer of `queue` on the newest connection, so it outlives
    /// a later connection failure.
    pub fn consumer_handle(&self, queue: &str) -> Option<ConsumerHandle> {
        let conn = self.current()?;
        let consumers = lock(&conn.consumers);
        consumers.get(queue).map(|consumer| ConsumerHandle {
            queue: queue.to_owned(),
            consumer: consumer.clone(),
            shared: self.shared.clone(),
        })
    }

    /// Simulates a broker-initiated close of the newest connection.
    pub fn fail_connection(&self, code: u16, reason: &str) {
        if let Some(conn) = self.current() {
            conn.terminate(LinkState::Failed(CloseReason::new(Some(code), reason)));
        }
    }

    fn current(&self) -> Option<Arc<FakeConnection>> {
        lock(&self.shared).connections.last().cloned()
    }

    fn record(&self, event: BrokerEvent) {
        lock(&self.shared).events.push(event);
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn dial(
        &self,
        uri: &str,
        tls: Option<TlsSettings>,
    ) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        let mut shared = lock(&self.shared);
        shared.dial_times.push(Instant::now());

        if shared.dial_failures > 0 {
            shared.dial_failures -= 1;
            shared.events.push(BrokerEvent::DialFailed);
            return Err(AmqpError::ConnectionError("connection refused".to_owned()));
        }

        shared.events.push(BrokerEvent::Dialed {
            uri: uri.to_owned(),
            tls: tls.is_some(),
        });

        let (state, _) = watch::channel(LinkState::Open);
        let conn = Arc::new(FakeConnection {
            broker: self.clone(),
            state,
            consumers: Arc::new(Mutex::new(HashMap::new())),
        });
        shared.connections.push(conn.clone());

        Ok(conn)
    }
}

/// A consumer kept past its connection's lifetime.
pub struct ConsumerHandle {
    queue: String,
    consumer: mpsc::UnboundedSender<Delivery>,
    shared: Arc<Mutex<Shared>>,
}

impl ConsumerHandle {
    /// Returns false once the consuming side has gone away.
    pub fn deliver(&self, body: &[u8]) -> bool {
        let acker = FakeAcker {
            queue: self.queue.clone(),
            body: body.to_vec(),
            shared: self.shared.clone(),
        };
        self.consumer
            .send(Delivery::new(body.to_vec(), Box::new(acker)))
            .is_ok()
    }
}

type Consumers = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>;

pub struct FakeConnection {
    broker: FakeBroker,
    state: watch::Sender<LinkState>,
    consumers: Consumers,
}

impl FakeConnection {
    /// Moves to a terminal state and ends every consumer stream.
    fn terminate(&self, next: LinkState) {
        self.state.send_if_modified(|current| {
            if *current != LinkState::Open {
                return false;
            }
            *current = next;
            true
        });

        lock(&self.consumers).clear();
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    fn is_closed(&self) -> bool {
        *self.state.borrow() != LinkState::Open
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, AmqpError> {
        if self.is_closed() {
            return Err(AmqpError::ChannelError("connection closed".to_owned()));
        }

        Ok(Box::new(FakeSession {
            broker: self.broker.clone(),
            consumers: self.consumers.clone(),
        }))
    }

    async fn closed(&self) -> Option<CloseReason> {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| *state != LinkState::Open).await {
            Ok(state) => state.clone(),
            Err(_) => LinkState::Closed,
        };

        match state {
            LinkState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.terminate(LinkState::Closed);
        self.broker.record(BrokerEvent::ConnectionClosed);
        Ok(())
    }
}

struct FakeSession {
    broker: FakeBroker,
    consumers: Consumers,
}

impl FakeSession {
    fn check_exchange(&self, exchange: &str) -> Result<(), AmqpError> {
        if lock(&self.broker.shared).rejected_exchanges.contains(exchange) {
            return Err(AmqpError::DeclareExchangeError(exchange.to_owned()));
        }

        Ok(())
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        self.check_exchange(def.name())?;
        self.broker
            .record(BrokerEvent::ExchangeDeclared(def.name().to_owned()));
        Ok(())
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        self.broker
            .record(BrokerEvent::QueueDeclared(def.name().to_owned()));
        Ok(())
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.broker.record(BrokerEvent::QueueBound {
            queue: binding.queue_name().to_owned(),
            exchange: binding.exchange_name().to_owned(),
        });
        Ok(())
    }

    async fn consume(&self, queue: &str, _tag: &str) -> Result<DeliveryStream, AmqpError> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.consumers).insert(queue.to_owned(), tx);
        self.broker.record(BrokerEvent::Consumed(queue.to_owned()));

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (Ok(delivery), rx))
        })
        .boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        _routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AmqpError> {
        self.broker.record(BrokerEvent::Published {
            exchange: exchange.to_owned(),
            body: body.to_vec(),
            content_type: content_type.to_owned(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.broker.record(BrokerEvent::SessionClosed);
        Ok(())
    }
}

struct FakeAcker {
    queue: String,
    body: Vec<u8>,
    shared: Arc<Mutex<Shared>>,
}

#[async_trait]
impl Acker for FakeAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        lock(&self.shared).events.push(BrokerEvent::Acked {
            queue: self.queue.clone(),
            body: self.body.clone(),
        });
        Ok(())
    }
}
