//! Named staging directories and template substitution over them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::CoreError;

/// Absolute paths of the named directories a run was staged into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingLayout {
    base: PathBuf,
    dirs: BTreeMap<String, PathBuf>,
}

impl StagingLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            dirs: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.dirs.insert(name.into(), path.into());
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dirs.contains_key(name)
    }

    pub fn path(&self, name: &str) -> Result<&Path, CoreError> {
        self.dirs
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| CoreError::UnknownDirectory {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.dirs
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"(?i)\$(?:(\$)|([_a-z][_a-z0-9]*)|\{([_a-z][_a-z0-9]*)\})")
            .expect("placeholder regex is valid")
    })
}

/// Substitute `$name` and `${name}` with the matching directory path.
///
/// `$$` yields a literal `$`. A placeholder naming no directory is an error.
pub fn render_template(template: &str, layout: &StagingLayout) -> Result<String, CoreError> {
    let mut missing = None;
    let rendered = placeholder().replace_all(template, |caps: &Captures<'_>| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let key = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match layout.path(key) {
            Ok(path) => path.display().to_string(),
            Err(_) => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(key) => Err(CoreError::Template { key }),
        None => Ok(rendered.into_owned()),
    }
}
