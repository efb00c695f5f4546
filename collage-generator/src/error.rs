use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollageError {
    #[error("malformed collage request: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error("the detection output has no labelled instance with a bounding box")]
    MissingDetection,

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// The bounding box covers no whole pixel of the source image.
    #[error("the bounding box selects an empty {width}x{height} region")]
    EmptyCrop { width: u32, height: u32 },

    #[error("failed to decode or encode an image: {0}")]
    Image(#[from] image::ImageError),

    #[error("storage failure: {0}")]
    Storage(#[from] opendal::Error),

    #[error("the compositing task did not complete: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl CollageError {
    /// Whether the caller sent something we can never process, as opposed to a failure on our side.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_)
                | Self::MissingDetection
                | Self::InvalidBoundingBox(_)
                | Self::EmptyCrop { .. }
        )
    }
}
