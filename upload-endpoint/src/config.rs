use std::{collections::HashMap, net::SocketAddr, str::FromStr};

use anyhow::Context;
use config::{Environment, File, FileFormat, builder::DefaultState};
use dotenvy::vars;

pub struct UploadConfig {
    pub bind_addr: SocketAddr,
    /// The bucket receiving the uploads.
    ///
    /// Not required at startup: without it, every request is answered with 500.
    pub input_bucket: Option<String>,
    pub s3: S3Settings,
}

/// Connection settings of the S3-compatible store.
///
/// Unset values fall back to the AWS environment and profile chain.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

pub fn parse_config() -> anyhow::Result<UploadConfig> {
    let dotenv_variables = HashMap::from_iter(vars());

    let config = config::ConfigBuilder::<DefaultState>::default()
        .add_source(Environment::default())
        .add_source(Environment::default().source(Some(dotenv_variables)))
        .add_source(File::new("config.toml", FileFormat::Toml).required(false))
        .build()
        .context("Failed to build configuration")?;

    from_config(&config)
}

fn from_config(config: &config::Config) -> anyhow::Result<UploadConfig> {
    let bind_addr = config
        .get_string("bind_addr")
        .unwrap_or_else(|_| "0.0.0.0:8080".into());
    let bind_addr = SocketAddr::from_str(&bind_addr).context("Invalid BIND_ADDR")?;

    let input_bucket = config.get_string("input_bucket").ok();
    if input_bucket.is_none() {
        tracing::warn!(
            "INPUT_BUCKET is not set. Every upload request will be answered with an error until it is configured."
        );
    }

    let s3 = S3Settings {
        endpoint: config.get_string("s3_endpoint").ok(),
        region: config.get_string("s3_region").ok(),
        access_key_id: config.get_string("s3_access_key_id").ok(),
        secret_access_key: config.get_string("s3_secret_access_key").ok(),
    };

    Ok(UploadConfig {
        bind_addr,
        input_bucket,
        s3,
    })
}
