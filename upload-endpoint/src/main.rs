pub(crate) mod config;
pub(crate) mod storage;
pub(crate) mod upload;

use std::sync::Arc;

use anyhow::Context as _;
use poem::{Server, listener::TcpListener};
use storage::{Storage, UploadSigner};
use upload::UploadState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::parse_config()?;

    let signer = match &config.input_bucket {
        Some(bucket) => {
            let storage = Storage::from_settings(&config.s3, bucket).await;
            Some(Arc::new(storage) as Arc<dyn UploadSigner>)
        }
        None => None,
    };

    let app = upload::routes(UploadState::new(signer));

    tracing::info!(
        "Issuing upload URLs on http://127.0.0.1:{port}/",
        port = config.bind_addr.port()
    );

    Server::new(TcpListener::bind(config.bind_addr))
        .run(app)
        .await
        .context("Upload endpoint server failed")?;

    Ok(())
}
