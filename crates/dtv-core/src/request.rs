use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use crate::error::RequestError;

/// Image extensions recognised when naming and discovering stored images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Fallback extension when neither the location nor the response tells us.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// What to generate. Built once, then only read by providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    negative_prompt: Option<String>,
    width: u32,
    height: u32,
    params: BTreeMap<String, String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, width: u32, height: u32) -> Result<Self, RequestError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        if width == 0 || height == 0 {
            return Err(RequestError::InvalidDimensions { width, height });
        }

        Ok(Self {
            prompt,
            negative_prompt: None,
            width,
            height,
            params: BTreeMap::new(),
        })
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        let negative_prompt = negative_prompt.into();
        self.negative_prompt = (!negative_prompt.trim().is_empty()).then_some(negative_prompt);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn orientation(&self) -> Orientation {
        match self.width.cmp(&self.height) {
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    RemoteUrl,
    LocalTempPath,
}

/// Where one provider left its image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub source_kind: SourceKind,
    pub location: String,
    pub provider_id: String,
}

impl GenerationResult {
    pub fn remote(provider_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_kind: SourceKind::RemoteUrl,
            location: url.into(),
            provider_id: provider_id.into(),
        }
    }

    pub fn local(provider_id: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            source_kind: SourceKind::LocalTempPath,
            location: path.as_ref().to_string_lossy().into_owned(),
            provider_id: provider_id.into(),
        }
    }

    /// Image extension implied by the location, if it names a known one.
    pub fn extension_hint(&self) -> Option<&'static str> {
        let path = match self.source_kind {
            SourceKind::RemoteUrl => reqwest::Url::parse(&self.location)
                .ok()
                .map(|url| url.path().to_string())?,
            SourceKind::LocalTempPath => self.location.clone(),
        };
        known_extension(Path::new(&path).extension()?.to_str()?)
    }
}

/// Normalizes `ext` to one of [`IMAGE_EXTENSIONS`].
pub fn known_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

/// Extension for an image MIME type such as `image/png; charset=binary`.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// An image written into the images folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
}

impl StoredImage {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// `generated_image_<YYYYMMDD_HHMMSS>.<ext>`
pub fn image_file_name(created_at: &DateTime<Local>, ext: &str) -> String {
    format!("generated_image_{}.{}", created_at.format("%Y%m%d_%H%M%S"), ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_validation() {
        assert!(matches!(
            GenerationRequest::new("  ", 10, 10),
            Err(RequestError::EmptyPrompt)
        ));
        assert!(matches!(
            GenerationRequest::new("sunset", 0, 10),
            Err(RequestError::InvalidDimensions { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_request_builder() {
        let req = GenerationRequest::new("sunset", 2048, 1152)
            .unwrap()
            .with_negative_prompt("")
            .with_param("seed", "42");
        assert_eq!(req.negative_prompt(), None);
        assert_eq!(req.param("seed"), Some("42"));
        assert_eq!(req.orientation(), Orientation::Landscape);
    }

    #[test]
    fn test_extension_hint() {
        let remote = GenerationResult::remote("openai", "https://cdn.example/img/abc.PNG?sig=1");
        assert_eq!(remote.extension_hint(), Some("png"));

        let opaque = GenerationResult::remote("ideogram", "https://cdn.example/api/images/abc");
        assert_eq!(opaque.extension_hint(), None);

        let local = GenerationResult::local("huggingface", "/tmp/a.webp");
        assert_eq!(local.extension_hint(), Some("webp"));
    }

    #[test]
    fn test_mime_extension() {
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("IMAGE/WEBP; q=1"), Some("webp"));
        assert_eq!(extension_for_mime("application/json"), None);
    }

    #[test]
    fn test_image_file_name() {
        let ts = Local.with_ymd_and_hms(2025, 1, 31, 7, 5, 9).unwrap();
        assert_eq!(image_file_name(&ts, "webp"), "generated_image_20250131_070509.webp");
    }
}
