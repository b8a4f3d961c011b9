/// A direct exchange owned by one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            durable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }
}
