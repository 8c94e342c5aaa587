use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use crate::error::FetchError;
use crate::request::{
    extension_for_mime, image_file_name, known_extension, GenerationResult, SourceKind, StoredImage,
    DEFAULT_EXTENSION,
};

type Clock = Box<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Moves a provider's output into the images folder under a timestamped name.
pub struct Fetcher {
    client: Client,
    clock: Clock,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            clock: Box::new(Local::now),
        }
    }

    /// Replaces the wall clock used to name files.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn fetch(&self, result: &GenerationResult, folder: &Path) -> Result<StoredImage, FetchError> {
        fs::create_dir_all(folder).map_err(|source| FetchError::Io {
            folder: folder.to_path_buf(),
            source,
        })?;

        let created_at = (self.clock)();
        let path = match result.source_kind {
            SourceKind::RemoteUrl => self.download(result, folder, &created_at)?,
            SourceKind::LocalTempPath => copy_local(result, folder, &created_at)?,
        };

        info!("Image saved locally at {}", path.display());
        Ok(StoredImage { path, created_at })
    }

    fn download(
        &self,
        result: &GenerationResult,
        folder: &Path,
        created_at: &DateTime<Local>,
    ) -> Result<PathBuf, FetchError> {
        let url = &result.location;
        let download_err = |reason: String| FetchError::Download {
            url: url.clone(),
            reason,
        };

        debug!("Downloading {url}");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| download_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_err(format!("HTTP {status}")));
        }

        let ext = result
            .extension_hint()
            .or_else(|| {
                response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(extension_for_mime)
            })
            .unwrap_or(DEFAULT_EXTENSION);
        let dest = folder.join(image_file_name(created_at, ext));

        let file = File::create(&dest).map_err(|source| FetchError::Io {
            folder: folder.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let written = response
            .copy_to(&mut writer)
            .map_err(|e| e.to_string())
            .and_then(|n| writer.flush().map(|_| n).map_err(|e| e.to_string()));
        drop(writer);

        match written {
            Ok(0) => {
                discard(&dest);
                Err(download_err("response body was empty".into()))
            }
            Ok(n) => {
                debug!("Downloaded {n} bytes from {url}");
                Ok(dest)
            }
            Err(reason) => {
                discard(&dest);
                Err(download_err(reason))
            }
        }
    }
}

fn copy_local(
    result: &GenerationResult,
    folder: &Path,
    created_at: &DateTime<Local>,
) -> Result<PathBuf, FetchError> {
    let source = Path::new(&result.location);
    let missing = |reason: &str| FetchError::MissingSource {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    };

    if !source.is_file() {
        return Err(missing("file not found"));
    }

    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .and_then(known_extension)
        .unwrap_or(DEFAULT_EXTENSION);
    let dest = folder.join(image_file_name(created_at, ext));

    let copied = fs::copy(source, &dest).map_err(|source| FetchError::Io {
        folder: folder.to_path_buf(),
        source,
    })?;
    if copied == 0 {
        discard(&dest);
        return Err(missing("file is empty"));
    }

    Ok(dest)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!("Could not remove partial file {}: {}", path.display(), e);
    }
}
