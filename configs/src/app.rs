use crate::Environment;

#[derive(Debug, Clone)]
pub struct AppConfigs {
    ///Default: relay
    pub name: String,
    ///Default: Environment::Local
    pub env: Environment,
    ///Default: debug
    pub log_level: String,
    ///Default: false
    pub enable_external_creates_logging: bool,
}

impl Default for AppConfigs {
    fn default() -> Self {
        Self {
            name: "relay".to_owned(),
            env: Environment::Local,
            log_level: "debug".to_owned(),
            enable_external_creates_logging: false,
        }
    }
}
