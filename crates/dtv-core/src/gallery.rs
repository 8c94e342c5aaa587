use std::fs;
use std::io;
use std::path::Path;
use crate::request::known_extension;

/// True for file names ending in one of the known image extensions.
pub fn is_image_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(known_extension)
        .is_some()
}

/// Image files directly inside `folder`, sorted by name.
///
/// Generated names embed their timestamp, so the order is also chronological.
pub fn list_images(folder: &Path) -> io::Result<Vec<String>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_image_file_name(name) {
                images.push(name.to_string());
            }
        }
    }
    images.sort();
    Ok(images)
}
