use bytes::Bytes;
use rand::Rng;

use crate::{
    compositor::{self, CANVAS_KEY, Placement},
    error::CollageError,
    event::CollageRequest,
    storage::{ObjectState, Storage},
};

/// Pastes detected objects from the input bucket onto the collage in the output bucket.
///
/// The collage is read, modified and written back without any locking: when
/// two generators work on it at once, the last write wins and the other
/// paste is lost.
#[derive(Clone)]
pub struct CollageGenerator {
    input: Storage,
    output: Storage,
}

impl CollageGenerator {
    pub fn new(input: Storage, output: Storage) -> Self {
        Self { input, output }
    }

    #[tracing::instrument(skip(self, request, rng), fields(image = %request.image))]
    pub async fn generate<R>(
        &self,
        request: &CollageRequest,
        mut rng: R,
    ) -> Result<Placement, CollageError>
    where
        R: Rng + Send + 'static,
    {
        let bounding_box = request.bounding_box()?;

        let canvas = self.fetch_canvas().await?;
        let source = self.input.read(&request.image).await?;

        let (png, placement) = tokio::task::spawn_blocking(move || {
            let mut canvas = match canvas {
                Some(bytes) => compositor::decode_canvas(&bytes)?,
                None => compositor::blank_canvas(),
            };
            let source = image::load_from_memory(&source)?;

            let placement = compositor::composite(&mut canvas, &source, &bounding_box, &mut rng)?;
            let png = compositor::encode_png(&canvas)?;

            Ok::<_, CollageError>((png, placement))
        })
        .await??;

        self.output.write(CANVAS_KEY, png).await?;

        tracing::info!("Pasted onto the collage: {placement:?}");
        Ok(placement)
    }

    /// The encoded collage, or `None` when there is none yet.
    async fn fetch_canvas(&self) -> Result<Option<Bytes>, CollageError> {
        match self.output.object_state(CANVAS_KEY).await? {
            ObjectState::Present => Ok(Some(self.output.read(CANVAS_KEY).await?)),
            ObjectState::Absent => {
                tracing::info!("No collage yet; starting from a blank canvas");
                Ok(None)
            }
        }
    }
}
