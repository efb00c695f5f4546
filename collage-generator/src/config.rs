use std::collections::HashMap;

use anyhow::Context;
use config::{Environment, File, FileFormat, builder::DefaultState};
use dotenvy::vars;
use opendal::services::S3Config;

pub struct GeneratorConfig {
    pub nats_url: String,
    /// The subject collage requests are published on.
    pub subject: String,
    /// The bucket the uploaded images are read from.
    pub input_bucket: String,
    /// The bucket holding the collage.
    pub output_bucket: String,
    pub s3: S3Settings,
}

/// Connection settings of the S3-compatible store, shared by both buckets.
///
/// Unset values fall back to the AWS environment and profile chain.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Settings {
    pub fn s3_config(&self, bucket: &str) -> S3Config {
        let mut config = S3Config::default();
        config.bucket = bucket.to_string();
        config.endpoint = self.endpoint.clone();
        config.region = self.region.clone();
        config.access_key_id = self.access_key_id.clone();
        config.secret_access_key = self.secret_access_key.clone();

        config
    }
}

pub fn parse_config() -> anyhow::Result<GeneratorConfig> {
    let dotenv_variables = HashMap::from_iter(vars());

    let config = config::ConfigBuilder::<DefaultState>::default()
        .add_source(Environment::default())
        .add_source(Environment::default().source(Some(dotenv_variables)))
        .add_source(File::new("config.toml", FileFormat::Toml).required(false))
        .build()
        .context("Failed to build configuration")?;

    from_config(&config)
}

fn from_config(config: &config::Config) -> anyhow::Result<GeneratorConfig> {
    let nats_url = config.get_string("nats_url").context(
        "NATS_URL is not set. NATS is required for the generator to receive the collage requests.",
    )?;
    let subject = config
        .get_string("collage_subject")
        .unwrap_or_else(|_| "collage".into());

    let input_bucket = config
        .get_string("input_bucket")
        .context("INPUT_BUCKET is not set. The generator reads the uploaded images from it.")?;
    let output_bucket = config
        .get_string("output_bucket")
        .context("OUTPUT_BUCKET is not set. The generator stores the collage in it.")?;

    let s3 = S3Settings {
        endpoint: config.get_string("s3_endpoint").ok(),
        region: config.get_string("s3_region").ok(),
        access_key_id: config.get_string("s3_access_key_id").ok(),
        secret_access_key: config.get_string("s3_secret_access_key").ok(),
    };

    Ok(GeneratorConfig {
        nats_url,
        subject,
        input_bucket,
        output_bucket,
        s3,
    })
}
