//! Remote detector over HTTP
//!
//! Polls an endpoint that returns the current face count, either as JSON
//! (`{"face_count": 1}`) or as a bare integer.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{FaceSource, parse_face_count};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct FaceCountBody {
    face_count: usize,
    #[serde(default)]
    error: Option<String>,
}

/// Source backed by a remote detector endpoint
pub struct HttpSource {
    url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl HttpSource {
    /// Create a source that polls `url`, giving each request at most `timeout`
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: None,
        }
    }

    fn fetch(&self, client: &Client) -> Result<usize> {
        let resp = client.get(&self.url).send()?;
        let status = resp.status();
        let body = resp.text()?;

        if !status.is_success() {
            return Err(Error::Capture(format!(
                "detector returned {status}: {}",
                body.trim()
            )));
        }

        parse_body(&body)
    }
}

/// Interpret a detector response body
fn parse_body(body: &str) -> Result<usize> {
    if let Ok(parsed) = serde_json::from_str::<FaceCountBody>(body) {
        return match parsed.error {
            Some(error) => Err(Error::Capture(error)),
            None => Ok(parsed.face_count),
        };
    }

    parse_face_count(body)
        .ok_or_else(|| Error::Capture(format!("unparsable detector response: {:?}", body.trim())))
}

impl FaceSource for HttpSource {
    fn name(&self) -> String {
        format!("http: {}", self.url)
    }

    // Blocking clients own a runtime; they are only built and dropped here
    // and in `release`, both of which run on the blocking pool.
    fn acquire(&mut self) -> Result<()> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::SourceUnavailable(format!("failed to build client: {e}")))?;

        if let Err(e) = self.fetch(&client) {
            return Err(Error::SourceUnavailable(format!(
                "detector at {} not reachable: {e}",
                self.url
            )));
        }

        self.client = Some(client);
        Ok(())
    }

    fn capture_and_count(&mut self) -> Result<usize> {
        let Some(client) = &self.client else {
            return Err(Error::Capture("detector not acquired".to_string()));
        };

        self.fetch(client).map_err(|e| match e {
            Error::Capture(_) => e,
            other => Error::Capture(other.to_string()),
        })
    }

    fn release(&mut self) {
        self.client = None;
    }
}
