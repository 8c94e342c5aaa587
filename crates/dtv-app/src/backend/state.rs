use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use dtv_core::gallery::is_image_file_name;
use dtv_core::{ArtPusher, Fetcher, Pipeline};
use dtv_gen::PromptGenerator;
use crate::config::AppConfig;
use crate::device::SamsungConnector;
use crate::runner;

pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline<SamsungConnector>,
    pub pusher: ArtPusher<SamsungConnector>,
    pub fetcher: Fetcher,
    pub prompt_generator: Option<PromptGenerator>,
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = runner::http_client()?;
        Ok(Self {
            pipeline: runner::build_pipeline(&config, &client),
            pusher: runner::build_pusher(&config),
            fetcher: Fetcher::new(client.clone()),
            prompt_generator: runner::prompt_generator(&config, &client),
            config,
            device_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Lock serializing sessions to one device address.
    ///
    /// Entries nobody holds any more are dropped, so the map only tracks
    /// devices with a session in flight.
    pub fn device_lock(&self, address: &str) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.device_locks);
        locks.retain(|_, device| Arc::strong_count(device) > 1);
        Arc::clone(locks.entry(address.to_string()).or_default())
    }

    /// Path of a stored image by bare file name.
    pub fn image_path(&self, file_name: &str) -> Option<PathBuf> {
        stored_image_path(&self.config.images_folder, file_name)
    }
}

/// Locks ignoring poisoning; the guarded data stays valid after a panic.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Joins `file_name` onto `folder` if it is a single plain image file name.
pub fn stored_image_path(folder: &Path, file_name: &str) -> Option<PathBuf> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if is_image_file_name(file_name) => Some(folder.join(file_name)),
        _ => None,
    }
}
