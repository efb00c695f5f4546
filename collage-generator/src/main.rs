pub(crate) mod compositor;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod event;
pub(crate) mod generator;
pub(crate) mod storage;

use anyhow::Context as _;
use crate::config::GeneratorConfig;
use event::{CollageRequest, CollageResponse};
use futures::StreamExt as _;
use generator::CollageGenerator;
use rand::{SeedableRng, rngs::StdRng};
use storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let GeneratorConfig {
        nats_url,
        subject,
        input_bucket,
        output_bucket,
        s3,
    } = config::parse_config()?;

    let generator = CollageGenerator::new(
        Storage::from_config(s3.s3_config(&input_bucket))
            .context("Failed to build input storage")?,
        Storage::from_config(s3.s3_config(&output_bucket))
            .context("Failed to build output storage")?,
    );

    let nats_client = async_nats::connect(&nats_url)
        .await
        .context("Failed to connect to NATS")?;

    let mut request_subscriber = nats_client.subscribe(subject.clone()).await?;

    tracing::info!("Waiting for collage requests on {subject}");

    // One request at a time: pastes from this worker never race each other.
    while let Some(message) = request_subscriber.next().await {
        let reply = message.reply.clone();

        let response = match CollageRequest::try_from(message) {
            Ok(request) => match generator.generate(&request, StdRng::from_os_rng()).await {
                Ok(_) => CollageResponse::ok(),
                Err(err) => {
                    tracing::error!("Failed to paste {} onto the collage: {err:?}", request.image);
                    CollageResponse::from_error(&err)
                }
            },
            Err(err) => {
                tracing::warn!("Failed to parse the collage request: {err:?}; skipping.");
                CollageResponse::from_error(&err)
            }
        };

        let Some(reply) = reply else {
            continue;
        };

        let payload = match response.to_bytes() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!("Failed to serialize the response: {err:?}");
                continue;
            }
        };

        if let Err(err) = nats_client.publish(reply, payload).await {
            tracing::error!("Failed to reply to the collage request: {err:?}");
        }
    }

    Ok(())
}
