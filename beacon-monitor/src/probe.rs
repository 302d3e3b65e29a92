use std::fmt;

use beacon_core::{ContentDigest, Endpoint};
use reqwest::{Client, Method, Url};

use crate::MonitorError;

/// Method and URL of a check; results are ordered by this tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckContext {
    pub method: String,
    pub url: String,
}

impl fmt::Display for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.method, self.url)
    }
}

/// Outcome of checking one endpoint. A failing result means the site is
/// wrong, not the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub context: CheckContext,
    pub pass: bool,
    pub message: String,
}

impl CheckResult {
    pub fn pass(context: CheckContext) -> Self {
        Self {
            context,
            pass: true,
            message: String::new(),
        }
    }

    pub fn fail(context: CheckContext, message: impl Into<String>) -> Self {
        Self {
            context,
            pass: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.pass { "PASS" } else { "FAIL" };
        write!(f, "{status}: {}", self.context)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// An endpoint whose method and URL have been validated, ready to send.
#[derive(Debug, Clone)]
pub(crate) struct Probe {
    method: Method,
    url: Url,
    expected_status: u16,
    expected_hash: ContentDigest,
    context: CheckContext,
}

impl Probe {
    pub(crate) fn new(endpoint: &Endpoint) -> Result<Self, MonitorError> {
        let method = Method::from_bytes(endpoint.method.as_bytes()).map_err(|_| MonitorError::InvalidMethod {
            method: endpoint.method.clone(),
            url: endpoint.url.clone(),
        })?;
        let invalid_url = |reason: String| MonitorError::InvalidUrl {
            url: endpoint.url.clone(),
            reason,
        };
        let url = Url::parse(&endpoint.url).map_err(|e| invalid_url(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_url(format!("unsupported scheme {:?}", url.scheme())));
        }

        Ok(Self {
            method,
            url,
            expected_status: endpoint.expected_status_code,
            expected_hash: endpoint.expected_body_hash.clone(),
            context: CheckContext {
                method: endpoint.method.clone(),
                url: endpoint.url.clone(),
            },
        })
    }

    /// Sends the request and compares status and body digest.
    ///
    /// Transport failures and timeouts are failing results. An error while
    /// reading a body that has started arriving is returned as `Err`.
    pub(crate) async fn check(&self, client: &Client) -> Result<CheckResult, MonitorError> {
        let context = self.context.clone();

        let response = match client.request(self.method.clone(), self.url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Ok(CheckResult::fail(context, error_chain(&e))),
        };

        let status = response.status().as_u16();
        if status != self.expected_status {
            return Ok(CheckResult::fail(
                context,
                format!("http-status: {status}<>{}", self.expected_status),
            ));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Ok(CheckResult::fail(context, error_chain(&e))),
            Err(source) => {
                return Err(MonitorError::Body {
                    url: self.url.to_string(),
                    source,
                });
            }
        };

        let digest = ContentDigest::of(&body);
        if digest == self.expected_hash {
            Ok(CheckResult::pass(context))
        } else {
            Ok(CheckResult::fail(
                context,
                format!("res-hash: {digest}<>{}", self.expected_hash),
            ))
        }
    }
}

/// reqwest keeps the actual cause (refused, timed out, dns) in the source
/// chain.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
