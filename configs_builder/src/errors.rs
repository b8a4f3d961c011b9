use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigsError {
    #[error("internal error")]
    InternalError,

    #[error("invalid event binding `{0}`, expected kind:exchange:queue[:publish]")]
    InvalidEventBinding(String),

    #[error("`{0}` is not valid base64")]
    DecodingError(String),
}
