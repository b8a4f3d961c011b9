mod app;
mod configs;
mod environment;
mod rabbitmq;

pub use app::AppConfigs;
pub use configs::Configs;
pub use environment::Environment;
pub use rabbitmq::{CertsConfigs, CertsPaths, CertsSources, EventBinding, RabbitMQConfigs};
