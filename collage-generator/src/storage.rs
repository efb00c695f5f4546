use anyhow::Context;
use bytes::Bytes;
use opendal::{Configurator, ErrorKind, Operator, layers::LoggingLayer, services::S3Config};

/// Outcome of probing the store for an object.
///
/// Failures other than absence are not an [`ObjectState`]; they surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Present,
    Absent,
}

#[derive(Clone)]
pub struct Storage {
    operator: Operator,
}

impl Storage {
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }

    pub fn from_config(config: S3Config) -> anyhow::Result<Self> {
        let client = config.into_builder();

        let operator = Operator::new(client)
            .context("Failed to build OpenDAL operator for S3")?
            .layer(LoggingLayer::default())
            .finish();

        Ok(Self::new(operator))
    }

    /// A store living in process memory.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let operator = Operator::new(opendal::services::Memory::default())
            .expect("the memory service always builds")
            .layer(LoggingLayer::default())
            .finish();

        Self::new(operator)
    }

    /// An in-memory store whose existence checks are refused.
    #[cfg(test)]
    pub fn in_memory_denying_stat() -> Self {
        let operator = Operator::new(opendal::services::Memory::default())
            .expect("the memory service always builds")
            .layer(deny_stat::DenyStatLayer)
            .layer(LoggingLayer::default())
            .finish();

        Self::new(operator)
    }
}

impl Storage {
    pub async fn object_state(&self, key: &str) -> Result<ObjectState, opendal::Error> {
        match self.operator.stat(key).await {
            Ok(_) => Ok(ObjectState::Present),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ObjectState::Absent),
            Err(err) => Err(err),
        }
    }

    pub async fn read(&self, key: &str) -> Result<Bytes, opendal::Error> {
        let buffer = self.operator.read(key).await?;

        Ok(buffer.to_bytes())
    }

    /// Store `content` under `key`, replacing any previous object.
    pub async fn write(&self, key: &str, content: Vec<u8>) -> Result<(), opendal::Error> {
        self.operator.write(key, content).await?;

        Ok(())
    }
}
