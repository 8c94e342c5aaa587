use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::art::{ArtConnector, ArtPusher, DisplayStyle, UploadOutcome};
use crate::error::PipelineError;
use crate::fetch::Fetcher;
use crate::provider::ProviderChain;
use crate::request::{GenerationRequest, GenerationResult, SourceKind, StoredImage};

/// Removes a provider's temp output when dropped.
///
/// Only files under the process temp directory are ever removed.
#[derive(Debug, Default)]
pub struct TempArtifact {
    path: Option<PathBuf>,
}

impl TempArtifact {
    pub fn for_result(result: &GenerationResult) -> Self {
        let path = match result.source_kind {
            SourceKind::LocalTempPath => Some(PathBuf::from(&result.location)),
            SourceKind::RemoteUrl => None,
        };
        Self {
            path: path.filter(|p| is_temp_path(p)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
    }
}

fn is_temp_path(path: &Path) -> bool {
    let temp = std::env::temp_dir();
    let temp = temp.canonicalize().unwrap_or(temp);
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    path.starts_with(&temp)
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub generated: GenerationResult,
    pub stored: StoredImage,
    pub outcome: UploadOutcome,
}

/// Generate, store and display one image.
pub struct Pipeline<C: ArtConnector> {
    chain: ProviderChain,
    fetcher: Fetcher,
    pusher: ArtPusher<C>,
}

impl<C: ArtConnector> Pipeline<C> {
    pub fn new(chain: ProviderChain, fetcher: Fetcher, pusher: ArtPusher<C>) -> Self {
        Self {
            chain,
            fetcher,
            pusher,
        }
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Generates an image and stores it in `folder` without displaying it.
    pub fn generate_and_fetch(
        &self,
        request: &GenerationRequest,
        folder: &Path,
    ) -> Result<(GenerationResult, StoredImage), PipelineError> {
        let generated = self.chain.generate(request)?;
        let _temp = TempArtifact::for_result(&generated);
        let stored = self.fetcher.fetch(&generated, folder)?;
        Ok((generated, stored))
    }

    pub fn run(
        &self,
        request: &GenerationRequest,
        folder: &Path,
        device_address: &str,
        style: &DisplayStyle,
    ) -> Result<PipelineRun, PipelineError> {
        let generated = self.chain.generate(request)?;
        let _temp = TempArtifact::for_result(&generated);

        let stored = self.fetcher.fetch(&generated, folder)?;
        let outcome = self.pusher.push(&stored.path, device_address, style)?;

        info!(
            "Pushed {} from `{}` to {} (selected: {})",
            stored.path.display(),
            generated.provider_id,
            device_address,
            outcome.selected
        );
        Ok(PipelineRun {
            generated,
            stored,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::{ArtDevice, FileType};
    use crate::error::{DeviceError, Stage};
    use crate::provider::{BoxedProvider, ImageProvider};
    use std::time::Duration;

    struct TempFileProvider {
        path: PathBuf,
    }

    impl ImageProvider for TempFileProvider {
        fn id(&self) -> &str {
            "huggingface"
        }

        fn generate(&self, _request: &GenerationRequest) -> anyhow::Result<GenerationResult> {
            fs::write(&self.path, b"\xFF\xD8\xFF\xE0 fake jpeg")?;
            Ok(GenerationResult::local(self.id(), &self.path))
        }
    }

    struct Device {
        fail_upload: bool,
    }

    impl ArtDevice for Device {
        fn upload(&mut self, _image: &[u8], _file_type: FileType, _style: &DisplayStyle) -> Result<String, DeviceError> {
            if self.fail_upload {
                Err(DeviceError::Failure("rejected".into()))
            } else {
                Ok("MY_F0042".into())
            }
        }

        fn select_image(&mut self, _content_id: &str) -> Result<bool, DeviceError> {
            Ok(true)
        }

        fn close(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct Connector {
        fail_upload: bool,
    }

    impl ArtConnector for Connector {
        type Device = Device;

        fn connect(&self, _address: &str) -> Result<Device, DeviceError> {
            Ok(Device {
                fail_upload: self.fail_upload,
            })
        }
    }

    fn pipeline(temp_path: PathBuf, fail_upload: bool) -> Pipeline<Connector> {
        let chain = ProviderChain::new(vec![Box::new(TempFileProvider { path: temp_path }) as BoxedProvider]);
        let pusher = ArtPusher::new(Connector { fail_upload }).with_settle_delay(Duration::ZERO);
        Pipeline::new(chain, Fetcher::default(), pusher)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("misty forest", 64, 64).unwrap()
    }

    #[test]
    fn test_run_cleans_provider_temp_file() {
        let temp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let provider_file = temp.path().join("gen.jpg");

        let run = pipeline(provider_file.clone(), false)
            .run(&request(), out.path(), "tv", &DisplayStyle::default())
            .unwrap();

        assert!(run.outcome.selected);
        assert!(run.stored.path.exists());
        assert!(!provider_file.exists());
    }

    #[test]
    fn test_failed_push_still_cleans_temp_file() {
        let temp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let provider_file = temp.path().join("gen.jpg");

        let err = pipeline(provider_file.clone(), true)
            .run(&request(), out.path(), "tv", &DisplayStyle::default())
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Push);
        assert!(!provider_file.exists());
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_generate_stage_reported() {
        let chain = ProviderChain::default();
        let pusher = ArtPusher::new(Connector { fail_upload: false });
        let out = tempfile::tempdir().unwrap();

        let err = Pipeline::new(chain, Fetcher::default(), pusher)
            .generate_and_fetch(&request(), out.path())
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Generate);
    }

    #[test]
    fn test_temp_artifact_ignores_non_temp_paths() {
        let guard = TempArtifact::for_result(&GenerationResult::local("p", "/definitely/not/temp/a.png"));
        assert!(guard.path().is_none());
        let guard = TempArtifact::for_result(&GenerationResult::remote("p", "http://x/a.png"));
        assert!(guard.path().is_none());
    }
}
