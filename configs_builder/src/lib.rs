mod configs_builder;
pub mod env_keys;
pub mod errors;

pub use configs_builder::{parse_events, ConfigBuilder};
