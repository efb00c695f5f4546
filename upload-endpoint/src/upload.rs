use std::{collections::BTreeMap, sync::Arc, time::Duration};

use poem::{
    Endpoint, EndpointExt, Request, Response, ResponseBuilder, Route, get, handler,
    http::StatusCode,
    web::{Data, Query},
};
use rand::Rng;
use serde::Serialize;

use crate::storage::UploadSigner;

/// Length of the random part of an uploaded object's name.
pub const FILE_NAME_LENGTH: usize = 10;

/// Lifetime of an issued upload URL.
pub const UPLOAD_URL_EXPIRY: Duration = Duration::from_secs(3600);

pub const DEFAULT_EXTENSION: &str = "jpg";
pub const DEFAULT_MIME: &str = "image/jpeg";

#[derive(Clone)]
pub struct UploadState {
    /// `None` when no input bucket is configured.
    signer: Option<Arc<dyn UploadSigner>>,
}

impl UploadState {
    pub fn new(signer: Option<Arc<dyn UploadSigner>>) -> Self {
        Self { signer }
    }
}

/// The incoming request, echoed back to the client for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub http_method: String,
    pub path: String,
    pub query_string_parameters: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct UploadUrlBody<'a> {
    url: String,
    event: &'a UploadEvent,
}

/// Generate an object name of [`FILE_NAME_LENGTH`] lowercase letters followed by the extension.
///
/// There is no collision check; 26^10 names make one unlikely, not impossible.
pub fn random_file_name(rng: &mut impl Rng, extension: &str) -> String {
    let name: String = (0..FILE_NAME_LENGTH)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect();

    format!("{name}.{extension}")
}

fn with_cors(builder: ResponseBuilder) -> ResponseBuilder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
}

fn internal_error(message: String) -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .content_type("text/plain; charset=utf-8")
        .body(message)
}

/// Issue a pre-signed URL for uploading one image to the input bucket.
#[tracing::instrument(skip(signer))]
pub async fn authorize_upload(signer: Option<&dyn UploadSigner>, event: UploadEvent) -> Response {
    let Some(signer) = signer else {
        tracing::error!("Refusing to sign an upload: INPUT_BUCKET is not configured");
        return internal_error("Missing INPUT_BUCKET environment variable".into());
    };

    let parameters = &event.query_string_parameters;
    let extension = parameters
        .get("extension")
        .map(String::as_str)
        .unwrap_or(DEFAULT_EXTENSION);
    let mime = parameters
        .get("mime")
        .map(String::as_str)
        .unwrap_or(DEFAULT_MIME);

    let object_key = random_file_name(&mut rand::rng(), extension);

    let url = match signer
        .presign_upload(&object_key, mime, UPLOAD_URL_EXPIRY)
        .await
    {
        Ok(url) => url,
        Err(err) => {
            tracing::error!("Failed to presign the upload of {object_key}: {err:?}");
            return internal_error(format!("Error generating presigned URL: {err}"));
        }
    };

    tracing::info!("Issued an upload URL for {object_key} ({mime})");

    let body = match serde_json::to_string(&UploadUrlBody { url, event: &event }) {
        Ok(body) => body,
        Err(err) => return internal_error(format!("Failed to serialize the response: {err}")),
    };

    with_cors(Response::builder())
        .status(StatusCode::OK)
        .content_type("application/json")
        .body(body)
}

#[handler]
async fn upload_url(
    request: &Request,
    Query(query_string_parameters): Query<BTreeMap<String, String>>,
    Data(state): Data<&UploadState>,
) -> Response {
    let event = UploadEvent {
        http_method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query_string_parameters,
    };

    authorize_upload(state.signer.as_deref(), event).await
}

#[handler]
fn preflight() -> Response {
    with_cors(Response::builder())
        .status(StatusCode::OK)
        .finish()
}

pub fn routes(state: UploadState) -> impl Endpoint<Output = Response> {
    Route::new()
        .at("/", get(upload_url).options(preflight))
        .data(state)
}
