use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::category::Category;
use crate::config::Layout;
use crate::error::{PipelineError, Result};
use crate::http::Remote;

/// Stream `url` to `dest`. A partially written file is removed on failure.
pub fn download_file(remote: &dyn Remote, url: &str, dest: &Path) -> Result<u64> {
    let result = stream_to(remote, url, dest);
    if result.is_err() && dest.exists() {
        let _ = fs::remove_file(dest);
    }
    result
}

fn stream_to(remote: &dyn Remote, url: &str, dest: &Path) -> Result<u64> {
    let download = remote.open(url)?;
    let pb = match download.len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut body = pb.wrap_read(download.body);
    let mut out = BufWriter::new(File::create(dest)?);
    let written = io::copy(&mut body, &mut out)?;
    out.flush()?;
    pb.finish_and_clear();
    Ok(written)
}

/// Fetch every selected archive into the bronze directory, one at a time.
///
/// A failed category is logged and left out of the result; an empty result is
/// an error.
pub fn download_all(
    remote: &dyn Remote,
    layout: &Layout,
    selection: &BTreeMap<Category, String>,
) -> Result<BTreeMap<Category, PathBuf>> {
    let mut downloaded = BTreeMap::new();
    for (category, url) in selection {
        let dest = layout.archive(*category);
        info!("Downloading {} from {}", category, url);
        match download_file(remote, url, &dest) {
            Ok(bytes) => {
                info!(
                    "Download completed: {} ({:.2} MB)",
                    dest.display(),
                    bytes as f64 / 1024.0 / 1024.0
                );
                downloaded.insert(*category, dest);
            }
            Err(e) => error!("Download failed for {} at {}: {}", category, url, e),
        }
    }

    if downloaded.is_empty() {
        return Err(PipelineError::NothingDownloaded);
    }
    Ok(downloaded)
}
