//! Transparent reverse proxy to the beacon node.
//!
//! Requests the validator API does not intercept (node version, genesis,
//! spec, health, ...) pass through verbatim. In-flight proxied requests are
//! cancelled on shutdown.

use crate::error::ApiError;
use slog::{debug, Logger};
use tokio_util::sync::CancellationToken;
use url::Url;
use warp::http::header::CONTENT_TYPE;
use warp::http::{Method, Response};
use warp::hyper::body::Bytes;
use warp::path::FullPath;
use warp::Rejection;

#[derive(Clone)]
pub struct Proxy {
    client: reqwest::Client,
    target: Url,
    shutdown: CancellationToken,
    log: Logger,
}

impl Proxy {
    pub fn new(target: Url, shutdown: CancellationToken, log: Logger) -> Self {
        Self {
            client: reqwest::Client::new(),
            target,
            shutdown,
            log,
        }
    }

    pub async fn forward(
        &self,
        method: Method,
        path: FullPath,
        raw_query: String,
        body: Bytes,
    ) -> Result<Response<Vec<u8>>, Rejection> {
        let mut url = self
            .target
            .join(path.as_str())
            .map_err(|e| ApiError::internal(format!("proxy url: {}", e)).reject())?;
        if !raw_query.is_empty() {
            url.set_query(Some(&raw_query));
        }

        debug!(self.log, "Proxying request"; "method" => %method, "path" => path.as_str());

        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| ApiError::bad_request("unsupported method").reject())?;
        let request = self.client.request(method, url).body(body.to_vec());

        let response = tokio::select! {
            _ = self.shutdown.cancelled() => {
                return Err(ApiError::service_unavailable("shutting down").reject());
            }
            response = request.send() => response.map_err(|e| {
                ApiError::service_unavailable(format!("beacon node unreachable: {}", e)).reject()
            })?,
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::internal(format!("proxy body: {}", e)).reject())?;

        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .map_err(|e| ApiError::internal(format!("proxy response: {}", e)).reject())
    }
}
