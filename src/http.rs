use std::io::Read;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH};

use crate::config::Settings;
use crate::error::{PipelineError, Result};

/// An open download: the body reader plus the advertised length, if any.
pub struct Download<'a> {
    pub body: Box<dyn Read + 'a>,
    pub len: Option<u64>,
}

/// The three kinds of request the pipeline makes against the portal.
pub trait Remote {
    /// GET a page and return its body as text.
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// Metadata-only probe. `Ok(None)` when the server omits the length.
    fn probe_size(&self, url: &str) -> Result<Option<u64>>;

    /// Start a streamed GET.
    fn open(&self, url: &str) -> Result<Download<'_>>;
}

/// Blocking reqwest client with the portal's headers and per-call timeouts.
pub struct HttpRemote {
    client: Client,
    listing_timeout: std::time::Duration,
    probe_timeout: std::time::Duration,
    download_timeout: Option<std::time::Duration>,
}

impl HttpRemote {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            // Blocking clients default to 30s; timeouts are set per request instead.
            .timeout(None)
            .build()
            .map_err(|e| PipelineError::http(&settings.endpoint, e))?;
        Ok(HttpRemote {
            client,
            listing_timeout: settings.listing_timeout(),
            probe_timeout: settings.probe_timeout(),
            download_timeout: settings.download_timeout(),
        })
    }
}

fn checked(url: &str, response: reqwest::Result<Response>) -> Result<Response> {
    let response = response.map_err(|e| PipelineError::http(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

impl Remote for HttpRemote {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let response = checked(url, self.client.get(url).timeout(self.listing_timeout).send())?;
        response.text().map_err(|e| PipelineError::http(url, e))
    }

    fn probe_size(&self, url: &str) -> Result<Option<u64>> {
        // reqwest reports a zero body length for HEAD, so read the header directly.
        let response = checked(url, self.client.head(url).timeout(self.probe_timeout).send())?;
        Ok(content_length(response.headers()))
    }

    fn open(&self, url: &str) -> Result<Download<'_>> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.download_timeout {
            request = request.timeout(timeout);
        }
        let response = checked(url, request.send())?;
        let len = content_length(response.headers());
        Ok(Download {
            body: Box::new(response),
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2048"));
        assert_eq!(content_length(&headers), Some(2048));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), None);
    }
}
