use std::{path::PathBuf, sync::LazyLock};

use directories::{BaseDirs, ProjectDirs};

pub static PROJ_DIRS: LazyLock<Option<ProjectDirs>> = LazyLock::new(|| {
    ProjectDirs::from("", "", "soundboard")
});

const DATA_DIR: &str = ".soundboard";
const DATA_FILE: &str = "sounds.json";

/// `~/.soundboard/sounds.json`, or relative to the working directory when
/// no home directory can be found.
pub fn default_data_file() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR)
        .join(DATA_FILE)
}

pub fn settings_file() -> Option<PathBuf> {
    PROJ_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("settings.json"))
}
