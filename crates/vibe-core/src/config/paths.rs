//! Standard locations for Vibe configuration files

use std::path::PathBuf;

/// Directory holding Vibe configuration
///
/// Returns: `~/.config/vibe-player` (platform config dir, home as fallback)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("vibe-player")
}

/// Path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_app_specific() {
        assert!(default_config_dir().ends_with("vibe-player"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("config.yaml");
        assert!(path.ends_with("vibe-player/config.yaml"));
    }
}
