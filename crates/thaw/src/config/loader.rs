//! Multi-file configuration loading.

use std::path::Path;

use thaw_core::config::is_yaml_file;

use super::{Config, ConfigPath};
use crate::error::ConfigError;

/// Load and merge every file and directory, reporting all failures at once.
pub(super) fn load_from_paths(paths: &[ConfigPath]) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut errors = Vec::new();

    for path in paths {
        let (display, loaded) = match path {
            ConfigPath::File(file_path) => (file_path.display(), load_file(file_path)),
            ConfigPath::Dir(dir_path) => (dir_path.display(), load_dir(dir_path)),
        };

        match loaded.and_then(|partial| config.merge(partial)) {
            Ok(()) => {}
            Err(e) => errors.push(format!("{display}: {e}")),
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    Config::parse_unvalidated(&contents)
}

fn load_dir(dir: &Path) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut errors = Vec::new();

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();

    files.sort();

    for path in files {
        if let Err(e) = load_file(&path).and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {}", path.display(), e));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}
