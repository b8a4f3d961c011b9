use crate::{AppConfigs, RabbitMQConfigs};

#[derive(Debug, Clone, Default)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
}
