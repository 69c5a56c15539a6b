use std::error::Error;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories_next::BaseDirs;
use log::debug;

use super::settings::HostSettings;

const SETTINGS_FILE_NAME: &str = "host_settings.json";

pub fn config_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|base| base.config_dir().join("Orrery"))
}

pub fn host_settings_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(SETTINGS_FILE_NAME)
}

pub fn save_host_settings(
    storage_dir: &Path,
    settings: &HostSettings,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(settings)?;
    let path = host_settings_path(storage_dir);
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    fs::write(&path, json)?;
    debug!("saved host settings to {}", path.display());
    Ok(())
}

pub fn load_host_settings(
    storage_dir: &Path,
) -> Result<HostSettings, Box<dyn Error>> {
    let path = host_settings_path(storage_dir);
    let json = fs::read_to_string(path)?;
    let settings = serde_json::from_str::<HostSettings>(&json)?;
    Ok(settings)
}

pub fn load_host_settings_if_exists(
    storage_dir: &Path,
) -> Result<Option<HostSettings>, Box<dyn Error>> {
    match load_host_settings(storage_dir) {
        Ok(settings) => Ok(Some(settings)),
        Err(err) => {
            if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
                if io_err.kind() == ErrorKind::NotFound {
                    return Ok(None);
                }
            }
            Err(err)
        }
    }
}
