use async_nats::Message;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CollageError;

/// A request to paste the detected object of an uploaded image onto the collage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollageRequest {
    /// Key of the source image in the input bucket.
    pub image: String,
    pub rekognition_output: DetectionOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectionOutput {
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Label {
    pub name: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub bounding_box: BoundingBox,
    pub confidence: Option<f64>,
}

/// A rectangle relative to the image size; every field is expected in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

#[cfg(test)]
impl BoundingBox {
    pub const FULL: BoundingBox = BoundingBox {
        top: 0.0,
        left: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

impl CollageRequest {
    /// The bounding box of the first instance of the first label.
    ///
    /// Other labels and instances are ignored, and the label name is not
    /// checked: filtering by label is left to whoever publishes the request.
    pub fn bounding_box(&self) -> Result<BoundingBox, CollageError> {
        let label = self
            .rekognition_output
            .labels
            .first()
            .ok_or(CollageError::MissingDetection)?;
        let instance = label
            .instances
            .first()
            .ok_or(CollageError::MissingDetection)?;

        tracing::debug!(
            "Using the first instance of label {:?} (confidence {:?})",
            label.name,
            instance.confidence.or(label.confidence)
        );

        Ok(instance.bounding_box)
    }
}

impl TryFrom<&[u8]> for CollageRequest {
    type Error = CollageError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl TryFrom<Message> for CollageRequest {
    type Error = CollageError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        CollageRequest::try_from(&message.payload[..])
    }
}

/// The reply sent back to the invoker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollageResponse {
    pub status_code: u16,
    pub body: String,
}

impl CollageResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: "Image processed and saved successfully.".into(),
        }
    }

    pub fn from_error(error: &CollageError) -> Self {
        let status_code = if error.is_invalid_input() { 400 } else { 500 };

        Self {
            status_code,
            body: error.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
