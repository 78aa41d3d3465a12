//! HTTP transport used to reach snapshot.debian.org, the security tracker
//! and the bug tracker.
//!
//! Everything network-bound goes through the [`Fetcher`] trait so the
//! comparison engine can be exercised without a network.

use crate::errors::{DebcompareError, Result};
use std::time::Duration;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        HttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking HTTP client.
///
/// Non-2xx statuses are returned as responses, not errors; callers decide
/// which error a failed status maps to.
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse>;

    fn post(&self, url: &str, headers: &[(&str, &str)], body: &str) -> Result<HttpResponse>;
}

/// [`Fetcher`] backed by a `ureq` agent.
///
/// `timeout` bounds connecting, sending the request and waiting for the
/// response head. The body is never cut off by it: source tarballs may take
/// far longer than that to stream.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(timeout))
            .timeout_send_request(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        HttpFetcher { agent }
    }
}

fn read_response(url: &str, mut response: ureq::http::Response<ureq::Body>) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    // source tarballs and the tracker feed are well past ureq's default body limit
    let body = response
        .body_mut()
        .with_config()
        .limit(u64::MAX)
        .read_to_vec()
        .map_err(|e| http_error(url, e))?;
    log::debug!("{} -> HTTP {} ({} bytes)", url, status, body.len());
    Ok(HttpResponse { status, body })
}

fn http_error(url: &str, source: ureq::Error) -> DebcompareError {
    DebcompareError::Http {
        url: url.to_string(),
        source: Box::new(source),
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        log::info!("Fetching: {}", url);
        let response = self.agent.get(url).call().map_err(|e| http_error(url, e))?;
        read_response(url, response)
    }

    fn post(&self, url: &str, headers: &[(&str, &str)], body: &str) -> Result<HttpResponse> {
        log::info!("Posting to: {}", url);
        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send(body).map_err(|e| http_error(url, e))?;
        read_response(url, response)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher serving canned responses and counting requests.

    use super::*;
    use std::{
        collections::HashMap,
        sync::{Mutex, PoisonError},
    };

    #[derive(Default)]
    pub struct FakeFetcher {
        responses: Mutex<HashMap<String, HttpResponse>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, response: HttpResponse) {
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(url.to_string(), response);
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn respond(&self, url: &str) -> HttpResponse {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(url.to_string());
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(url)
                .cloned()
                .unwrap_or(HttpResponse {
                    status: 404,
                    body: Vec::new(),
                })
        }
    }

    impl Fetcher for FakeFetcher {
        fn get(&self, url: &str) -> Result<HttpResponse> {
            Ok(self.respond(url))
        }

        fn post(&self, url: &str, _headers: &[(&str, &str)], body: &str) -> Result<HttpResponse> {
            Ok(self.respond(&format!("{url}#{body}")))
        }
    }
}
