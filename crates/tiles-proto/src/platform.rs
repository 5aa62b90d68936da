use std::path::PathBuf;

const APP_DIR: &str = "dashboard-tiles";

/// Public URL prefix under which the static directory is served.
pub const STATIC_PREFIX: &str = "/static";

/// Public URL prefix of the icon directory. Icon values starting with this
/// prefix are treated as already-stored local icons.
pub const ICON_PREFIX: &str = "/static/icons/";

pub const DEFAULT_ICON_FILE: &str = "default.png";

/// Icon path used whenever no better icon is known.
pub const DEFAULT_ICON: &str = "/static/icons/default.png";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/dashboard-tiles/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        // Portable install: a data/ directory beside the executable wins
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let portable_data = exe_dir.join("data");
                if portable_data.exists() {
                    return portable_data;
                }
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let portable_config = exe_dir.join("config.toml");
                if portable_config.exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    // On macOS and Linux, always use ~/.config/dashboard-tiles/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Public path of an icon file stored in the icon directory.
pub fn icon_public_path(filename: &str) -> String {
    format!("{}{}", ICON_PREFIX, filename)
}

/// True when `icon` already names a file in the icon directory.
pub fn is_local_icon(icon: &str) -> bool {
    icon.starts_with(ICON_PREFIX)
}
