//! Where preset files live on disk.
//!
//! User presets sit under the platform config directory
//! (`~/.config/polyvox/presets/` on Linux), system presets under a shared
//! data directory (`/usr/share/polyvox/presets/` on Linux). Lookups by
//! name try the user directory first.
//!
//! # Example
//!
//! ```rust,no_run
//! use polyvox_config::paths;
//!
//! let preset = paths::resolve_preset("warm_pad").unwrap();
//! println!("{} uses the {} voice", preset.name, preset.voice.kind());
//! ```

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::preset::VoicePreset;

const APP_NAME: &str = "polyvox";
const PRESETS_SUBDIR: &str = "presets";
const PRESET_EXTENSION: &str = "toml";

/// Per-user configuration directory.
///
/// Falls back to the working directory when the platform has none.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Per-user preset directory.
pub fn user_presets_dir() -> PathBuf {
    user_config_dir().join(PRESETS_SUBDIR)
}

/// Shared, usually read-only, preset directory.
pub fn system_presets_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    let base = PathBuf::from("/usr/share");
    #[cfg(target_os = "macos")]
    let base = PathBuf::from("/Library/Application Support");
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_NAME).join(PRESETS_SUBDIR)
}

/// Locate a preset file.
///
/// `name` may be a path to an existing file, or a bare preset name with or
/// without the `.toml` extension, looked up in the user directory and then
/// the system directory.
pub fn find_preset(name: &str) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }

    let filename = if path.extension().is_some_and(|ext| ext == PRESET_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}.{PRESET_EXTENSION}")
    };

    [user_presets_dir(), system_presets_dir()]
        .into_iter()
        .map(|dir| dir.join(&filename))
        .find(|candidate| candidate.is_file())
}

/// Resolve a preset by factory name, file path, or user/system preset name.
///
/// Factory presets win over files with the same name.
///
/// # Errors
///
/// Returns [`ConfigError::PresetNotFound`] when nothing matches, or the
/// load error of the file that did match.
pub fn resolve_preset(name: &str) -> Result<VoicePreset> {
    if let Some(preset) = crate::factory_presets::get_factory_preset(name) {
        return Ok(preset);
    }
    match find_preset(name) {
        Some(path) => VoicePreset::load(path),
        None => Err(ConfigError::PresetNotFound(name.to_string())),
    }
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Create the user preset directory if needed and return it.
///
/// # Errors
///
/// Returns [`ConfigError::CreateDir`] if the directory cannot be created.
pub fn ensure_user_presets_dir() -> Result<PathBuf> {
    ensure_dir(user_presets_dir())
}

/// Create the user config directory if needed and return it.
///
/// # Errors
///
/// Returns [`ConfigError::CreateDir`] if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf> {
    ensure_dir(user_config_dir())
}

/// Preset files in `dir`. Missing or unreadable directories give an empty
/// list.
pub fn list_presets_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut presets: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == PRESET_EXTENSION))
        .collect();
    presets.sort();
    presets
}

/// Preset files in the user directory.
pub fn list_user_presets() -> Vec<PathBuf> {
    list_presets_in_dir(&user_presets_dir())
}

/// Preset files in the system directory.
pub fn list_system_presets() -> Vec<PathBuf> {
    list_presets_in_dir(&system_presets_dir())
}

/// User presets followed by system presets. Names are not deduplicated.
pub fn list_all_presets() -> Vec<PathBuf> {
    let mut presets = list_user_presets();
    presets.extend(list_system_presets());
    presets
}

/// File stem of a preset path.
///
/// ```rust
/// use polyvox_config::paths::preset_name_from_path;
/// use std::path::Path;
///
/// let name = preset_name_from_path(Path::new("/presets/bright_keys.toml"));
/// assert_eq!(name.as_deref(), Some("bright_keys"));
/// ```
pub fn preset_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}
