//! The pre-GraphQL 1.1 endpoints that the web client still leans on: the
//! form-encoded status update (our fallback when GraphQL rejects a write as
//! automated), account settings (the only cheap way to learn who the session
//! belongs to) and the chunked media upload host.

use crate::domain::interface::{HttpResponse, IHttpClient};
use crate::error::*;
use crate::repository::graphql::ApiErrors;
use crate::infra::Session;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const LEGACY_API_BASE: &str = "https://twitter.com/i/api/1.1/";
const UPLOAD_BASE: &str = "https://upload.twitter.com/1.1/";

// unreserved characters survive, everything else is escaped
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, utf8_percent_encode(value, FORM)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Clone)]
pub struct V1Api {
    session: Session,
    http: Arc<dyn IHttpClient + Send + Sync>,
}

impl V1Api {
    pub fn new(session: Session, http: Arc<dyn IHttpClient + Send + Sync>) -> V1Api {
        V1Api { session, http }
    }

    fn classify(&self, context: &str, response: HttpResponse) -> Result<Value> {
        if !response.is_success() {
            return Err(ServiceError::new(
                ApiError::HttpStatus(response.status.as_u16()),
                anyhow::anyhow!("{context} returned {}", response.status),
            ));
        }
        let json: Value =
            serde_json::from_str(&response.body).map_err(GeneralError::serialization_error)?;
        if let Some(failure) = ApiErrors::from_body(&json) {
            return Err(failure.into_service_error());
        }
        Ok(json)
    }

    /// the legacy write endpoint; returns the created status object
    pub async fn update_status(
        &self,
        status: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<Value> {
        let media = media_ids.join(",");
        let mut pairs = vec![("status", status)];
        if let Some(reply_id) = in_reply_to {
            pairs.push(("in_reply_to_status_id", reply_id));
            pairs.push(("auto_populate_reply_metadata", "true"));
        }
        if !media.is_empty() {
            pairs.push(("media_ids", media.as_str()));
        }

        log::info!("posting via legacy statuses/update");
        let response = self
            .http
            .post(
                &format!("{LEGACY_API_BASE}statuses/update.json"),
                Some(self.session.form_headers()?),
                Some(form_encode(&pairs)),
            )
            .await?;
        self.classify("statuses/update", response)
    }

    pub async fn account_settings(&self) -> Result<Value> {
        let response = self
            .http
            .get(
                &format!("{LEGACY_API_BASE}account/settings.json"),
                Some(self.session.graphql_headers()?),
            )
            .await?;
        self.classify("account/settings", response)
    }

    /// chunked upload: INIT, base64 APPENDs, FINALIZE, then poll the
    /// processing state until the backend settles
    pub async fn upload_media(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| {
            ServiceError::new(
                ApiError::Validation,
                anyhow::anyhow!("cannot read media file {}: {e}", path.display()),
            )
        })?;
        let media_type = guess_media_type(path)?;
        let url = format!("{UPLOAD_BASE}media/upload.json");

        let total_bytes = bytes.len().to_string();
        let response = self
            .http
            .post(
                &url,
                Some(self.session.form_headers()?),
                Some(form_encode(&[
                    ("command", "INIT"),
                    ("total_bytes", &total_bytes),
                    ("media_type", media_type),
                ])),
            )
            .await?;
        let init = self.classify("media INIT", response)?;
        let media_id = init
            .get("media_id_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::new(
                    ApiError::ApiLogic,
                    anyhow::anyhow!("media INIT returned no media id"),
                )
            })?
            .to_string();

        const CHUNK_BYTES: usize = 512 * 1024;
        for (index, chunk) in bytes.chunks(CHUNK_BYTES).enumerate() {
            let encoded = base64::encode(chunk);
            let segment = index.to_string();
            let response = self
                .http
                .post(
                    &url,
                    Some(self.session.form_headers()?),
                    Some(form_encode(&[
                        ("command", "APPEND"),
                        ("media_id", &media_id),
                        ("segment_index", &segment),
                        ("media_data", &encoded),
                    ])),
                )
                .await?;
            // APPEND answers an empty 2xx body
            if !response.is_success() {
                return Err(ServiceError::new(
                    ApiError::HttpStatus(response.status.as_u16()),
                    anyhow::anyhow!("media APPEND segment {segment} returned {}", response.status),
                ));
            }
        }

        let response = self
            .http
            .post(
                &url,
                Some(self.session.form_headers()?),
                Some(form_encode(&[
                    ("command", "FINALIZE"),
                    ("media_id", &media_id),
                ])),
            )
            .await?;
        let mut state = self.classify("media FINALIZE", response)?;

        // videos and gifs are processed asynchronously
        loop {
            let info = match state.get("processing_info") {
                Some(info) => info,
                None => break,
            };
            match info.get("state").and_then(|v| v.as_str()) {
                Some("succeeded") | None => break,
                Some("failed") => {
                    let message = info
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error");
                    return Err(ServiceError::new(
                        ApiError::ApiLogic,
                        anyhow::anyhow!("media processing failed: {message}"),
                    ));
                }
                _ => {}
            }

            let wait = info.get("check_after_secs").and_then(|v| v.as_u64()).unwrap_or(1);
            log::debug!("media {media_id} still processing, polling again in {wait}s");
            tokio::time::sleep(Duration::from_secs(wait)).await;

            let status_url = Url::parse_with_params(
                &format!("{url}?"),
                &[("command", "STATUS"), ("media_id", media_id.as_str())],
            )
            .map_err(GeneralError::serialization_error)?;
            let response = self
                .http
                .get(status_url.as_str(), Some(self.session.graphql_headers()?))
                .await?;
            state = self.classify("media STATUS", response)?;
        }

        Ok(media_id)
    }
}

fn guess_media_type(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("webp") => Ok("image/webp"),
        Some("gif") => Ok("image/gif"),
        Some("mp4") => Ok("video/mp4"),
        other => Err(ServiceError::new(
            ApiError::Validation,
            anyhow::anyhow!("unsupported media extension {other:?}"),
        )),
    }
}
