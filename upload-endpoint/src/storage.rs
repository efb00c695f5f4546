use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    presigning::PresigningConfig,
};

use crate::config::S3Settings;

/// Issues credentials for writing a single object directly to the store.
#[async_trait::async_trait]
pub trait UploadSigner: Send + Sync {
    /// Returns a URL allowing a `PUT` of `key` with the given content type until `expire` elapses.
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expire: Duration,
    ) -> anyhow::Result<String>;
}

/// The bucket receiving the uploads.
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_settings(settings: &S3Settings, bucket: &str) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        // use static credentials or defaults from environment
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "static",
            ));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = aws_sdk_s3::config::Builder::from(&loader.load().await)
            // S3-compatible stores such as MinIO only serve path-style URLs
            .force_path_style(settings.endpoint.is_some())
            .build();

        Self::new(Client::from_conf(config), bucket)
    }
}

#[async_trait::async_trait]
impl UploadSigner for Storage {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expire: Duration,
    ) -> anyhow::Result<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(expire)?)
            .await?;

        tracing::debug!("Presigned a PUT of {}/{key} for {expire:?}", self.bucket);

        Ok(request.uri().to_string())
    }
}
