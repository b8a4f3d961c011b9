use std::{
    env,
    fmt::{Display, Formatter, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Staging,
    Prod,
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let printable = match *self {
            Environment::Local => "local",
            Environment::Dev => "development",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        write!(f, "{}", printable)
    }
}

impl From<&str> for Environment {
    fn from(value: &str) -> Self {
        match value {
            "production" | "prod" | "PRODUCTION" | "PROD" => Environment::Prod,
            "staging" | "stg" | "STAGING" | "STG" => Environment::Staging,
            "develop" | "DEVELOP" | "dev" | "DEV" => Environment::Dev,
            _ => Environment::Local,
        }
    }
}

impl Environment {
    pub fn from_rust_env() -> Environment {
        Environment::from(env::var("RUST_ENV").unwrap_or_default().as_str())
    }

    pub fn is_local(&self) -> bool {
        self == &Environment::Local
    }
}
