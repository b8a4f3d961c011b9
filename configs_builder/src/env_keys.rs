pub const LOCAL_ENV_FILE_NAME: &str = "./.env.local";
pub const DEV_ENV_FILE_NAME: &str = "./.env.development";
pub const STAGING_FILE_NAME: &str = "./.env.staging";
pub const PROD_FILE_NAME: &str = "./.env.prod";

pub const APP_NAME_ENV_KEY: &str = "APP_NAME";
pub const LOG_LEVEL_ENV_KEY: &str = "LOG_LEVEL";
pub const ENABLE_EXTERNAL_CRATES_LOGGING_ENV_KEY: &str = "ENABLE_EXTERNAL_CRATES_LOGGING";

pub const RABBITMQ_HOST_ENV_KEY: &str = "RABBITMQ_HOST";
pub const RABBITMQ_PORT_ENV_KEY: &str = "RABBITMQ_PORT";
pub const RABBITMQ_USER_ENV_KEY: &str = "RABBITMQ_USER";
pub const RABBITMQ_PASSWORD_ENV_KEY: &str = "RABBITMQ_PASSWORD";
pub const RABBITMQ_VHOST_ENV_KEY: &str = "RABBITMQ_VHOST";
pub const RABBITMQ_TLS_ENV_KEY: &str = "RABBITMQ_TLS";
pub const RABBITMQ_TLS_FALLBACK_ENV_KEY: &str = "RABBITMQ_TLS_FALLBACK";
pub const RABBITMQ_RECONNECTION_INTERVAL_ENV_KEY: &str = "RABBITMQ_RECONNECTION_INTERVAL_MS";
pub const RABBITMQ_CA_CERT_ENV_KEY: &str = "RABBITMQ_CA_CERT";
pub const RABBITMQ_CLIENT_CERT_ENV_KEY: &str = "RABBITMQ_CLIENT_CERT";
pub const RABBITMQ_CLIENT_KEY_ENV_KEY: &str = "RABBITMQ_CLIENT_KEY";
pub const RABBITMQ_CA_CERT_PATH_ENV_KEY: &str = "RABBITMQ_CA_CERT_PATH";
pub const RABBITMQ_CLIENT_CERT_PATH_ENV_KEY: &str = "RABBITMQ_CLIENT_CERT_PATH";
pub const RABBITMQ_CLIENT_KEY_PATH_ENV_KEY: &str = "RABBITMQ_CLIENT_KEY_PATH";
pub const RABBITMQ_EVENTS_ENV_KEY: &str = "RABBITMQ_EVENTS";
