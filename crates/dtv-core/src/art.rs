use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use log::{debug, info, warn};
use crate::error::{DeviceError, PushError, SelectionError};

/// Wait between upload and selection; the device exposes no readiness signal.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Opens sessions against a display device.
pub trait ArtConnector {
    type Device: ArtDevice;

    fn connect(&self, address: &str) -> Result<Self::Device, DeviceError>;
}

/// An open art-mode session on a display device.
pub trait ArtDevice {
    /// Sends the whole image in one exchange and returns the device's content id.
    fn upload(&mut self, image: &[u8], file_type: FileType, style: &DisplayStyle) -> Result<String, DeviceError>;

    /// Asks the device to show `content_id`; `false` means the device did not confirm.
    fn select_image(&mut self, content_id: &str) -> Result<bool, DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Image encoding announced to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Jpeg,
    Png,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Jpeg => "JPEG",
            FileType::Png => "PNG",
        }
    }

    /// PNG when the bytes say so, JPEG otherwise.
    pub fn detect(image: &[u8]) -> Self {
        match image::guess_format(image) {
            Ok(image::ImageFormat::Png) => FileType::Png,
            _ => FileType::Jpeg,
        }
    }
}

/// Matte applied around the picture on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayStyle {
    pub matte: String,
    pub portrait_matte: Option<String>,
}

impl Default for DisplayStyle {
    fn default() -> Self {
        Self {
            matte: "flexible_polar".to_string(),
            portrait_matte: None,
        }
    }
}

impl DisplayStyle {
    pub fn with_matte(matte: impl Into<String>) -> Self {
        Self {
            matte: matte.into(),
            portrait_matte: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Uploaded,
    Selected,
    SelectionUnconfirmed,
    Closed,
}

/// Result of a push. `selected == false` with a content id is a partial success:
/// the image is on the device but was not shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub content_id: String,
    pub selected: bool,
    pub selection_error: Option<String>,
}

/// One connect/upload/select cycle against a single device.
///
/// Closed on every exit path, including drop.
pub struct ArtDisplaySession<'a, C: ArtConnector> {
    connector: &'a C,
    device: Option<C::Device>,
    address: String,
    state: SessionState,
    content_id: Option<String>,
    settle_delay: Duration,
}

impl<'a, C: ArtConnector> ArtDisplaySession<'a, C> {
    pub fn new(connector: &'a C, settle_delay: Duration) -> Self {
        Self {
            connector,
            device: None,
            address: String::new(),
            state: SessionState::Idle,
            content_id: None,
            settle_delay,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn connect(&mut self, address: &str) -> Result<(), PushError> {
        self.expect_state(SessionState::Idle)?;
        if address.trim().is_empty() {
            return Err(PushError::InvalidInput("device address is empty".into()));
        }

        info!("Connecting to display at {address}");
        let device = self.connector.connect(address).map_err(|e| match e {
            DeviceError::Timeout(reason) => PushError::Timeout {
                address: address.to_string(),
                reason,
            },
            DeviceError::Connection(reason) | DeviceError::Failure(reason) => PushError::Connection {
                address: address.to_string(),
                reason,
            },
        })?;

        self.device = Some(device);
        self.address = address.to_string();
        self.state = SessionState::Connected;
        Ok(())
    }

    pub fn upload(&mut self, image: &[u8], file_type: FileType, style: &DisplayStyle) -> Result<String, PushError> {
        if image.is_empty() {
            return Err(PushError::InvalidInput("image is empty".into()));
        }
        self.expect_state(SessionState::Connected)?;
        let device = self.device.as_mut().ok_or(PushError::InvalidState {
            expected: SessionState::Connected,
            actual: self.state,
        })?;

        info!(
            "Uploading {} bytes ({}) to {} with matte `{}`",
            image.len(),
            file_type.as_str(),
            self.address,
            style.matte
        );
        let content_id = device
            .upload(image, file_type, style)
            .map_err(|cause| PushError::Upload { cause })?;
        if content_id.trim().is_empty() {
            return Err(PushError::Upload {
                cause: DeviceError::Failure("device returned an empty content id".into()),
            });
        }

        info!("Upload accepted, content id {content_id}");
        self.content_id = Some(content_id.clone());
        self.state = SessionState::Uploaded;
        Ok(content_id)
    }

    /// Gives the device time to process the upload before selection.
    pub fn confirm(&mut self) -> Result<(), PushError> {
        self.expect_state(SessionState::Uploaded)?;
        debug!("Waiting {:?} for the device to settle", self.settle_delay);
        thread::sleep(self.settle_delay);
        Ok(())
    }

    /// Selects the uploaded content. Device refusals degrade to `selected == false`.
    pub fn select(&mut self, content_id: &str) -> Result<UploadOutcome, PushError> {
        self.expect_state(SessionState::Uploaded)?;

        let outcome = match self.try_select(content_id) {
            Ok(true) => {
                info!("Content {content_id} is now displayed");
                self.state = SessionState::Selected;
                UploadOutcome {
                    content_id: content_id.to_string(),
                    selected: true,
                    selection_error: None,
                }
            }
            Ok(false) => {
                warn!("Device did not confirm selection of {content_id}");
                self.state = SessionState::SelectionUnconfirmed;
                UploadOutcome {
                    content_id: content_id.to_string(),
                    selected: false,
                    selection_error: None,
                }
            }
            Err(err) => {
                warn!("{err}; the image stays uploaded and can be selected on the device");
                self.state = SessionState::SelectionUnconfirmed;
                UploadOutcome {
                    content_id: content_id.to_string(),
                    selected: false,
                    selection_error: Some(err.cause.to_string()),
                }
            }
        };
        Ok(outcome)
    }

    fn try_select(&mut self, content_id: &str) -> Result<bool, SelectionError> {
        let device = self.device.as_mut().ok_or_else(|| SelectionError {
            content_id: content_id.to_string(),
            cause: DeviceError::Connection("session has no device".into()),
        })?;
        device.select_image(content_id).map_err(|cause| SelectionError {
            content_id: content_id.to_string(),
            cause,
        })
    }

    /// Releases the session. Safe to call repeatedly and from any state.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            debug!("Closing session with {}", self.address);
            if let Err(e) = device.close() {
                warn!("Closing session with {} failed: {}", self.address, e);
            }
        }
        self.state = SessionState::Closed;
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), PushError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PushError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl<C: ArtConnector> Drop for ArtDisplaySession<'_, C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pushes images to display devices, one fresh session per push.
pub struct ArtPusher<C: ArtConnector> {
    connector: C,
    settle_delay: Duration,
}

impl<C: ArtConnector> ArtPusher<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn push(&self, image_path: &Path, device_address: &str, style: &DisplayStyle) -> Result<UploadOutcome, PushError> {
        let image = fs::read(image_path).map_err(|source| PushError::Read {
            path: image_path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes from {}", image.len(), image_path.display());
        self.push_bytes(&image, device_address, style)
    }

    /// Runs connect, upload, settle, select and close.
    ///
    /// Empty input is rejected before the device is contacted.
    pub fn push_bytes(&self, image: &[u8], device_address: &str, style: &DisplayStyle) -> Result<UploadOutcome, PushError> {
        if image.is_empty() {
            return Err(PushError::InvalidInput("image is empty".into()));
        }
        let file_type = FileType::detect(image);

        let mut session = ArtDisplaySession::new(&self.connector, self.settle_delay);
        let result = (|| {
            session.connect(device_address)?;
            let content_id = session.upload(image, file_type, style)?;
            session.confirm()?;
            session.select(&content_id)
        })();
        session.close();
        result
    }
}
