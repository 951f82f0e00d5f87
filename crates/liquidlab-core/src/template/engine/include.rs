//! `{% include %}` support
//!
//! `{% include 'header' %}` loads `<include_dir>/header.<ext>`, compiles it
//! on its own and splices its instructions in place.
//! `{% include 'card', item: product %}` assigns `item` first.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::template::expr::is_identifier;
use crate::template::expr::split::split_once;

/// Source of included template text
pub trait TemplateLoader: Send + Sync {
    fn load(&self, path: &Path) -> io::Result<String>;
}

/// Reads includes from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl TemplateLoader for FsLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves includes from memory, keyed by resolved path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), text.into());
        self
    }

    pub fn with(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no template registered at {}", path.display()),
            )
        })
    }
}

/// Parsed argument of an include tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IncludeRequest {
    pub path: String,
    /// `(name, value expression)`
    pub param: Option<(String, String)>,
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

pub(crate) fn parse_include(argument: &str) -> Result<IncludeRequest, String> {
    let (target, param) = match split_once(argument, ',') {
        Some((target, param)) => (target, Some(param)),
        None => (argument.trim(), None),
    };

    let path = unquote(target);
    if path.is_empty() {
        return Err("Include requires a template path".to_string());
    }

    let param = match param {
        None => None,
        Some(param) => {
            let (name, value) = split_once(param, ':')
                .filter(|(_, value)| !value.is_empty())
                .ok_or_else(|| format!("Invalid include parameter '{}', expected 'name: value'", param))?;
            if !is_identifier(name) {
                return Err(format!("Invalid variable name '{}'", name));
            }
            Some((name.to_string(), value.to_string()))
        }
    };

    Ok(IncludeRequest {
        path: path.to_string(),
        param,
    })
}

/// `include_dir/path` plus `.ext`, appended rather than substituted so
/// dotted names like `card.v2` keep their dot
pub(crate) fn resolve_path(include_dir: Option<&Path>, path: &str, extension: &str) -> PathBuf {
    let joined = match include_dir {
        Some(dir) => dir.join(path),
        None => PathBuf::from(path),
    };
    let mut joined: OsString = joined.into_os_string();
    joined.push(".");
    joined.push(extension);
    PathBuf::from(joined)
}

/// Chain of includes currently being compiled
#[derive(Debug, Default)]
pub(crate) struct IncludeChain {
    paths: Vec<PathBuf>,
}

impl IncludeChain {
    /// Enter `path`, rejecting cycles and chains deeper than `max_depth`
    pub fn enter(&mut self, path: &Path, max_depth: usize) -> Result<(), String> {
        if self.paths.iter().any(|p| p == path) {
            let cycle = self
                .paths
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(format!("Cyclic include: {}", cycle));
        }
        if self.paths.len() >= max_depth {
            return Err(format!(
                "Include depth limit of {} exceeded at {}",
                max_depth,
                path.display()
            ));
        }
        self.paths.push(path.to_path_buf());
        Ok(())
    }

    pub fn leave(&mut self) {
        self.paths.pop();
    }
}
