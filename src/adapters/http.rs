//! HTTP client adapter.
//!
//! Implements [`HttpPort`] over `EspHttpConnection` with the `embedded-svc`
//! blocking client. One connection is created per request so each request
//! can pick its own redirect policy.
//!
//! Off-target there is no network: every request fails with
//! [`NetworkError::Transport`].

use std::time::Duration;

#[allow(unused_imports)]
use log::{debug, info, warn};

use crate::app::ports::{HttpPort, HttpRequest, HttpResponse};
use crate::error::NetworkError;

/// Upper bound on a single request, connect to last body byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Responses larger than this are truncated.
pub const MAX_RESPONSE_BODY: usize = 64 * 1024;

/// Response headers the portal and upload flows read back.
#[allow(dead_code)]
const CAPTURED_HEADERS: [&str; 3] = ["Set-Cookie", "Location", "Content-Type"];

pub struct HttpClientAdapter {
    timeout: Duration,
}

impl HttpClientAdapter {
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpClientAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
mod esp {
    use embedded_svc::http::client::Client;
    use embedded_svc::http::{Headers, Status};
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection, FollowRedirectsPolicy};
    use esp_idf_svc::io::EspIOError;
    use esp_idf_svc::sys::{ESP_ERR_HTTP_CONNECT, ESP_ERR_HTTP_EAGAIN, esp_err_t};

    use super::*;
    use crate::app::ports::Method;

    fn map_err(e: EspIOError) -> NetworkError {
        let code = e.0.code();
        if code == ESP_ERR_HTTP_CONNECT as esp_err_t {
            NetworkError::ConnectionFailed
        } else if code == ESP_ERR_HTTP_EAGAIN as esp_err_t {
            NetworkError::Timeout
        } else {
            warn!("HTTP: transport error {}", e);
            NetworkError::Transport
        }
    }

    pub(super) fn execute(
        timeout: Duration,
        req: &HttpRequest,
    ) -> Result<HttpResponse, NetworkError> {
        let conn = EspHttpConnection::new(&Configuration {
            timeout: Some(timeout),
            follow_redirects_policy: if req.follow_redirects {
                FollowRedirectsPolicy::FollowAll
            } else {
                FollowRedirectsPolicy::FollowNone
            },
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|e| {
            warn!("HTTP: client setup failed ({})", e);
            NetworkError::Transport
        })?;
        let mut client = Client::wrap(conn);

        let method = match req.method {
            Method::Get => embedded_svc::http::Method::Get,
            Method::Post => embedded_svc::http::Method::Post,
        };
        let content_length = req.body.len().to_string();
        let mut headers: Vec<(&str, &str)> = req
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if req.method == Method::Post {
            headers.push(("Content-Length", &content_length));
        }

        let mut request = client
            .request(method, &req.url, &headers)
            .map_err(map_err)?;
        if !req.body.is_empty() {
            request.write_all(&req.body).map_err(map_err)?;
        }
        let mut response = request.submit().map_err(map_err)?;

        let status = response.status();
        let captured: Vec<(String, String)> = CAPTURED_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|v| ((*name).to_owned(), v.to_owned()))
            })
            .collect();

        let mut body = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = response.read(&mut chunk).map_err(map_err)?;
            if n == 0 {
                break;
            }
            if body.len() + n > MAX_RESPONSE_BODY {
                warn!("HTTP: response body truncated at {} bytes", MAX_RESPONSE_BODY);
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }

        debug!(
            "HTTP: {} {} -> {} ({} bytes)",
            method_name(req.method),
            req.url,
            status,
            body.len()
        );
        Ok(HttpResponse {
            status,
            headers: captured,
            body,
        })
    }

    fn method_name(m: Method) -> &'static str {
        match m {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl HttpPort for HttpClientAdapter {
    #[cfg(target_os = "espidf")]
    fn execute(&mut self, req: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        esp::execute(self.timeout, req)
    }

    #[cfg(not(target_os = "espidf"))]
    fn execute(&mut self, req: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        warn!("HTTP(sim): no network for {}", req.url);
        Err(NetworkError::Transport)
    }
}
