//! In-memory [`Remote`] used by tests in place of the portal.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use crate::error::{PipelineError, Result};
use crate::http::{Download, Remote};

#[derive(Default)]
pub struct FakeRemote {
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    sizes: HashMap<String, Option<u64>>,
    failing_probes: HashSet<String>,
    failing_downloads: HashSet<String>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Serve `bytes` at `url`; the probe reports their length unless overridden.
    pub fn with_file(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.sizes
            .entry(url.to_string())
            .or_insert(Some(bytes.len() as u64));
        self.files.insert(url.to_string(), bytes);
        self
    }

    pub fn with_size(mut self, url: &str, size: Option<u64>) -> Self {
        self.sizes.insert(url.to_string(), size);
        self
    }

    pub fn failing_probe(mut self, url: &str) -> Self {
        self.failing_probes.insert(url.to_string());
        self
    }

    pub fn failing_download(mut self, url: &str) -> Self {
        self.failing_downloads.insert(url.to_string());
        self
    }

    fn not_found(url: &str) -> PipelineError {
        PipelineError::Status {
            url: url.to_string(),
            status: 404,
        }
    }
}

impl Remote for FakeRemote {
    fn fetch_text(&self, url: &str) -> Result<String> {
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    fn probe_size(&self, url: &str) -> Result<Option<u64>> {
        if self.failing_probes.contains(url) {
            return Err(PipelineError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        self.sizes.get(url).copied().ok_or_else(|| Self::not_found(url))
    }

    fn open(&self, url: &str) -> Result<Download<'_>> {
        if self.failing_downloads.contains(url) {
            return Err(PipelineError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        let bytes = self.files.get(url).ok_or_else(|| Self::not_found(url))?;
        Ok(Download {
            body: Box::new(Cursor::new(bytes.as_slice())),
            len: Some(bytes.len() as u64),
        })
    }
}
