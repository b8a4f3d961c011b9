use crate::{
    broker::{Acker, Broker, BrokerConnection, CloseReason, Delivery, DeliveryStream, Session},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    tls::TlsSettings,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    tcp::{OwnedIdentity, OwnedTLSConfig},
    types::{FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

const AMQP_REPLY_SUCCESS: u16 = 200;

/// [`Broker`] backed by a lapin connection.
pub struct LapinBroker {
    connection_name: String,
}

impl LapinBroker {
    pub fn new(connection_name: &str) -> Arc<LapinBroker> {
        Arc::new(LapinBroker {
            connection_name: connection_name.to_owned(),
        })
    }
}

#[async_trait]
impl Broker for LapinBroker {
    async fn dial(
        &self,
        uri: &str,
        tls: Option<TlsSettings>,
    ) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        debug!("creating amqp connection...");
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.connection_name.clone()));

        let conn = match tls {
            Some(settings) => {
                let config = OwnedTLSConfig {
                    identity: Some(OwnedIdentity {
                        der: settings.identity.der,
                        password: settings.identity.password,
                    }),
                    cert_chain: Some(settings.ca_chain),
                };
                Connection::connect_with_config(uri, options, config).await
            }
            None => Connection::connect(uri, options).await,
        }
        .map_err(|err| {
            error!(error = err.to_string(), "failure to connect");
            AmqpError::ConnectionError(err.to_string())
        })?;
        debug!("amqp connected");

        Ok(Arc::new(LapinConnection::new(conn)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Open,
    Closed,
    Failed(CloseReason),
}

pub struct LapinConnection {
    conn: Connection,
    state: Arc<watch::Sender<LinkState>>,
}

impl LapinConnection {
    fn new(conn: Connection) -> LapinConnection {
        let (state, _) = watch::channel(LinkState::Open);
        let state = Arc::new(state);

        let notifier = state.clone();
        conn.on_error(move |err| {
            let reason = close_reason(&err);
            notifier.send_if_modified(|current| transition(current, LinkState::Failed(reason)));
        });

        LapinConnection { conn, state }
    }
}

/// Only the first terminal state sticks, a failure after an intentional close is noise.
fn transition(current: &mut LinkState, next: LinkState) -> bool {
    if *current != LinkState::Open {
        return false;
    }

    *current = next;
    true
}

fn close_reason(err: &lapin::Error) -> CloseReason {
    match err {
        lapin::Error::ProtocolError(amqp) => {
            CloseReason::new(Some(amqp.get_id()), amqp.get_message().as_str())
        }
        other => CloseReason::new(None, &other.to_string()),
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    fn is_closed(&self) -> bool {
        !self.conn.status().connected()
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = self.conn.create_channel().await.map_err(|err| {
            error!(error = err.to_string(), "error to create the channel");
            AmqpError::ChannelError(err.to_string())
        })?;
        debug!("channel created");

        Ok(Box::new(LapinSession { channel }))
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
        self.state
            .send_if_modified(|current| transition(current, LinkState::Closed));

        if self.is_closed() {
            return Ok(());
        }

        self.conn
            .close(AMQP_REPLY_SUCCESS, "OK")
            .await
            .map_err(|err| AmqpError::ConnectionError(err.to_string()))
    }
}

pub struct LapinSession {
    channel: Channel,
}

#[async_trait]
impl Session for LapinSession {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        self.channel
            .exchange_declare(
                &def.name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: def.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                AmqpError::DeclareExchangeError(def.name.clone())
            })
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", def.name);

        self.channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    durable: def.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                AmqpError::DeclareQueueError(def.name.clone())
            })?;

        Ok(())
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to exchange: {}",
            binding.queue_name, binding.exchange_name
        );

        self.channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind the queue");
                AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                )
            })
    }

    async fn consume(&self, queue: &str, tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to create the consumer");
                AmqpError::BindingConsumerError(tag.to_owned())
            })?;

        Ok(consumer
            .map(|result| match result {
                Ok(delivery) => Ok(Delivery::new(
                    delivery.data,
                    Box::new(LapinAcker(delivery.acker)),
                )),
                Err(err) => Err(AmqpError::DeliveryError(err.to_string())),
            })
            .boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), AmqpError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: false,
                    immediate: false,
                },
                body,
                BasicProperties::default()
                    .with_content_type(ShortString::from(content_type))
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string())),
            )
            .await
            .map_err(|err| {
                error!("publish err - {:?}", err);
                AmqpError::PublishingError(exchange.to_owned())
            })?;

        Ok(())
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.channel.status().connected() {
            return Ok(());
        }

        self.channel
            .close(AMQP_REPLY_SUCCESS, "OK")
            .await
            .map_err(|err| AmqpError::ChannelError(err.to_string()))
    }
}

struct LapinAcker(lapin::acker::Acker);

#[async_trait]
impl Acker for LapinAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        self.0
            .ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }
}
