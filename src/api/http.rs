use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::{blocking::Client, header::ACCEPT, StatusCode};

use crate::state::export::ExportRequest;

use super::{ParcelApi, SearchResponse, SearchResponseBody};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = "parcel-vision";

/// Talks to a parcel service over HTTP:
/// - `POST {base}/api/search` with `{"inputs": [...]}`
/// - `POST {base}/api/download/{kml|shp}` with an export request body
pub struct HttpParcelApi {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpParcelApi {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        accept: &str,
    ) -> anyhow::Result<Vec<u8>> {
        log::debug!("POST {} accepting {}", url, accept);
        let response = self
            .client
            .post(url)
            .header(ACCEPT, accept)
            .json(body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("{} did not answer within {:?}", url, self.timeout)
                } else {
                    anyhow!("Request to {} failed: {}", url, err)
                }
            })?;
        let status = response.status();
        let payload = response
            .bytes()
            .with_context(|| format!("Reading response from {}", url))?;
        check_status(url, status, &payload)?;
        Ok(payload.to_vec())
    }
}

/// Turn a non-success status into an error carrying the server's explanation, if any.
fn check_status(url: &str, status: StatusCode, payload: &[u8]) -> anyhow::Result<()> {
    if status.is_success() {
        return Ok(());
    }
    // Error bodies look like {"detail": "..."}.
    let detail = serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|body| {
            body.get("detail")
                .and_then(|detail| detail.as_str().map(str::to_string))
        });
    match detail {
        Some(detail) => Err(anyhow!("HTTP {} from {}: {}", status, url, detail)),
        None => Err(anyhow!("HTTP {} from {}", status, url)),
    }
}

impl ParcelApi for HttpParcelApi {
    fn search(&self, inputs: &[String]) -> anyhow::Result<SearchResponse> {
        let url = self.endpoint("api/search");
        let payload = self.post_json(
            &url,
            &serde_json::json!({ "inputs": inputs }),
            "application/json",
        )?;
        let body: SearchResponseBody =
            serde_json::from_slice(&payload).context("Decoding search response")?;
        Ok(body.into())
    }

    fn export(&self, request: &ExportRequest) -> anyhow::Result<Vec<u8>> {
        let url = self.endpoint(&format!("api/download/{}", request.format.name()));
        let payload = self.post_json(&url, &request.to_json(), request.format.media_type())?;
        log::debug!("Received {} bytes from {}", payload.len(), url);
        Ok(payload)
    }
}
