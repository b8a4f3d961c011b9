use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum AmqpError {
    #[error("failure to connect `{0}`")]
    ConnectionError(String),

    #[error("connection is absent or already closed")]
    ConnectionClosedError,

    #[error("failure to create a channel `{0}`")]
    ChannelError(String),

    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    #[error("failure to publish to exchange `{0}`")]
    PublishingError(String),

    #[error("failure to ack message")]
    AckMessageError,

    #[error("failure to receive delivery `{0}`")]
    DeliveryError(String),

    #[error("no listener registered for kind `{0}`")]
    UnknownKindError(String),

    #[error("tls setup failure `{0}`")]
    TlsError(String),
}
