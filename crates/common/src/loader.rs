use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::configuration::ConfigDocument;
use crate::errors::ConfigError;

const CONFIG_EXTENSION: &str = "yaml";

/// Discovers endpoint configs under a root directory.
///
/// Every `.yaml` file below the root becomes one [`ConfigDocument`] whose
/// route path mirrors the file's location: `root/a/b.yaml` serves `/a/b`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walks the tree. Each call starts a fresh traversal.
    pub fn load(&self) -> ConfigDocuments {
        ConfigDocuments {
            root: self.root.clone(),
            pending_dirs: vec![self.root.clone()],
            pending_files: VecDeque::new(),
        }
    }

    /// Loads every document, stopping at the first failure.
    pub fn load_all(&self) -> Result<Vec<ConfigDocument>, ConfigError> {
        self.load().collect()
    }
}

/// Iterator over the documents of one traversal.
#[derive(Debug)]
pub struct ConfigDocuments {
    root: PathBuf,
    pending_dirs: Vec<PathBuf>,
    pending_files: VecDeque<PathBuf>,
}

impl ConfigDocuments {
    fn scan(&mut self, dir: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let file_type = entry.file_type().map_err(io_error)?;
            let path = entry.path();
            if file_type.is_dir() {
                self.pending_dirs.push(path);
            } else if file_type.is_file()
                && path.extension().is_some_and(|ext| ext == CONFIG_EXTENSION)
            {
                self.pending_files.push_back(path);
            }
        }
        Ok(())
    }

    fn read(&self, file: &Path) -> Result<ConfigDocument, ConfigError> {
        let route = derive_route_path(&self.root, file);
        let contents = fs::read_to_string(file).map_err(|source| ConfigError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        debug!(file = %file.display(), route = %route, "loading config");
        ConfigDocument::from_yaml(&route, &contents, file)
    }
}

impl Iterator for ConfigDocuments {
    type Item = Result<ConfigDocument, ConfigError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.pending_files.pop_front() {
                return Some(self.read(&file));
            }
            let dir = self.pending_dirs.pop()?;
            if let Err(err) = self.scan(&dir) {
                self.pending_dirs.clear();
                return Some(Err(err));
            }
        }
    }
}

/// `/` followed by the file's path relative to `root`, extension removed.
pub fn derive_route_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", segments.join("/"))
}
