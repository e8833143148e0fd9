#![forbid(unsafe_code)]

//! Blocking HTTP access used by the resolver and the feed fetcher.

use std::time::Duration;

use anyhow::{Context, Result};

const USER_AGENT: &str = concat!("feedgrab-tools/", env!("CARGO_PKG_VERSION"));

/// Status and body of a completed request. Non-2xx answers are still
/// responses; only transport failures are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// `ureq`-backed client. The agent is shared by every resolver worker.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        match self.agent.get(url).call() {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .with_context(|| format!("reading response body from {url}"))?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(err).with_context(|| format!("requesting {url}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_only_2xx() {
        let response = |status| HttpResponse {
            status,
            body: String::new(),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(301).is_success());
        assert!(!response(404).is_success());
        assert!(!response(500).is_success());
    }
}
