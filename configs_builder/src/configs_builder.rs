use crate::{
    env_keys::{
        APP_NAME_ENV_KEY, DEV_ENV_FILE_NAME, ENABLE_EXTERNAL_CRATES_LOGGING_ENV_KEY,
        LOCAL_ENV_FILE_NAME, LOG_LEVEL_ENV_KEY, PROD_FILE_NAME, RABBITMQ_CA_CERT_ENV_KEY,
        RABBITMQ_CA_CERT_PATH_ENV_KEY, RABBITMQ_CLIENT_CERT_ENV_KEY,
        RABBITMQ_CLIENT_CERT_PATH_ENV_KEY, RABBITMQ_CLIENT_KEY_ENV_KEY,
        RABBITMQ_CLIENT_KEY_PATH_ENV_KEY, RABBITMQ_EVENTS_ENV_KEY, RABBITMQ_HOST_ENV_KEY,
        RABBITMQ_PASSWORD_ENV_KEY, RABBITMQ_PORT_ENV_KEY, RABBITMQ_RECONNECTION_INTERVAL_ENV_KEY,
        RABBITMQ_TLS_ENV_KEY, RABBITMQ_TLS_FALLBACK_ENV_KEY, RABBITMQ_USER_ENV_KEY,
        RABBITMQ_VHOST_ENV_KEY, STAGING_FILE_NAME,
    },
    errors::ConfigsError,
};
use base64::{engine::general_purpose, Engine};
use configs::{AppConfigs, Configs, Environment, EventBinding};
use dotenvy::from_filename;
use std::{env, str::FromStr, time::Duration};
use tracing::error;

const PUBLISH_ONLY_MARKER: &str = "publish";

#[derive(Default)]
pub struct ConfigBuilder {
    rabbitmq: bool,
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn rabbitmq(mut self) -> Self {
        self.rabbitmq = true;
        self
    }

    /// Loads the dotenv file of the current `RUST_ENV`, initializes logging and reads
    /// every enabled section from the process environment.
    pub fn build(&self) -> Result<Configs, ConfigsError> {
        let env = Environment::from_rust_env();
        match env {
            Environment::Prod => {
                from_filename(PROD_FILE_NAME).ok();
            }
            Environment::Staging => {
                from_filename(STAGING_FILE_NAME).ok();
            }
            Environment::Dev => {
                from_filename(DEV_ENV_FILE_NAME).ok();
            }
            _ => {
                from_filename(LOCAL_ENV_FILE_NAME).ok();
            }
        }

        let mut cfg = Configs::default();
        self.fill_app(&mut cfg, env);

        match logging::setup(&cfg.app) {
            Err(_) => Err(ConfigsError::InternalError),
            _ => Ok(()),
        }?;

        self.fill(&mut cfg, env::vars())?;

        Ok(cfg)
    }
}

impl ConfigBuilder {
    fn fill<I>(&self, cfg: &mut Configs, vars: I) -> Result<(), ConfigsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            self.fill_rabbitmq(cfg, &key, value)?;
        }

        Ok(())
    }

    fn fill_app(&self, cfg: &mut Configs, env: Environment) {
        let name = self.fmt_name(
            &env,
            env::var(APP_NAME_ENV_KEY).unwrap_or(cfg.app.name.clone()),
        );
        let log_level = env::var(LOG_LEVEL_ENV_KEY).unwrap_or("debug".to_owned());
        let enable_external_creates_logging = self.get_value(
            ENABLE_EXTERNAL_CRATES_LOGGING_ENV_KEY,
            env::var(ENABLE_EXTERNAL_CRATES_LOGGING_ENV_KEY).unwrap_or_default(),
            false,
        );

        cfg.app = AppConfigs {
            name,
            env,
            log_level,
            enable_external_creates_logging,
        };
    }

    fn fill_rabbitmq(
        &self,
        cfg: &mut Configs,
        key: &str,
        value: String,
    ) -> Result<bool, ConfigsError> {
        let rabbitmq = &mut cfg.rabbitmq;

        match key {
            RABBITMQ_HOST_ENV_KEY if self.rabbitmq => {
                rabbitmq.host = self.get_value(key, value, "localhost".to_owned());
            }
            RABBITMQ_PORT_ENV_KEY if self.rabbitmq => {
                rabbitmq.port = self.get_value(key, value, 5672);
            }
            RABBITMQ_USER_ENV_KEY if self.rabbitmq => {
                rabbitmq.user = self.get_value(key, value, "guest".to_owned());
            }
            RABBITMQ_PASSWORD_ENV_KEY if self.rabbitmq => {
                rabbitmq.password = self.get_value(key, value, "guest".to_owned());
            }
            RABBITMQ_VHOST_ENV_KEY if self.rabbitmq => {
                rabbitmq.vhost = value;
            }
            RABBITMQ_TLS_ENV_KEY if self.rabbitmq => {
                rabbitmq.tls = self.get_value(key, value, false);
            }
            RABBITMQ_TLS_FALLBACK_ENV_KEY if self.rabbitmq => {
                rabbitmq.allow_plaintext_fallback = self.get_value(key, value, true);
            }
            RABBITMQ_RECONNECTION_INTERVAL_ENV_KEY if self.rabbitmq => {
                rabbitmq.reconnection_interval =
                    Duration::from_millis(self.get_value(key, value, 1000));
            }
            RABBITMQ_CA_CERT_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.sources.ca = self.decoded(key, &value)?;
            }
            RABBITMQ_CLIENT_CERT_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.sources.client_cert = self.decoded(key, &value)?;
            }
            RABBITMQ_CLIENT_KEY_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.sources.client_key = self.decoded(key, &value)?;
            }
            RABBITMQ_CA_CERT_PATH_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.paths.ca = value;
            }
            RABBITMQ_CLIENT_CERT_PATH_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.paths.client_cert = value;
            }
            RABBITMQ_CLIENT_KEY_PATH_ENV_KEY if self.rabbitmq => {
                rabbitmq.certs.paths.client_key = value;
            }
            RABBITMQ_EVENTS_ENV_KEY if self.rabbitmq => {
                rabbitmq.events = parse_events(&value)?;
            }
            _ => return Ok(false),
        }

        Ok(true)
    }
}

impl ConfigBuilder {
    fn get_value<T>(&self, key: &str, value: String, default: T) -> T
    where
        T: FromStr,
    {
        if value.is_empty() {
            return default;
        }

        value.parse().unwrap_or_else(|_| {
            error!(key = key, value = value, "parse went wrong");
            default
        })
    }

    fn fmt_name(&self, env: &Environment, name: String) -> String {
        let env_str = env.to_string();
        if name.starts_with(&env_str) {
            return name;
        }

        format!("{}-{}", env_str, name)
    }

    fn decoded(&self, key: &str, text: &str) -> Result<Vec<u8>, ConfigsError> {
        general_purpose::STANDARD.decode(text.trim()).map_err(|err| {
            error!(error = err.to_string(), key = key, "base64 decoded error");
            ConfigsError::DecodingError(key.to_owned())
        })
    }
}

/// Parses a comma separated list of `kind:exchange:queue[:publish]` entries.
pub fn parse_events(value: &str) -> Result<Vec<EventBinding>, ConfigsError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_event)
        .collect()
}

fn parse_event(entry: &str) -> Result<EventBinding, ConfigsError> {
    let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigsError::InvalidEventBinding(entry.to_owned()));
    }

    match parts.as_slice() {
        [kind, exchange, queue] => Ok(EventBinding::new(kind, exchange, queue)),
        [kind, exchange, queue, PUBLISH_ONLY_MARKER] => {
            Ok(EventBinding::new(kind, exchange, queue).publish_only())
        }
        _ => Err(ConfigsError::InvalidEventBinding(entry.to_owned())),
    }
}
