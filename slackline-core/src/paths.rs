// ABOUTME: XDG Base Directory paths for slackline's config file and approval database.
// ABOUTME: Falls back to the working directory when no home directory can be determined.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "slackline";
const APPLICATION: &str = "slackline";

/// File name searched for in the working directory and the config dir
pub const CONFIG_FILE_NAME: &str = "slackline.toml";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// e.g. ~/.local/share/slackline/, or ./data
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// e.g. ~/.config/slackline/, or .
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}
