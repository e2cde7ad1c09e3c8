//! Script references and the local scripts directory.
//!
//! A script is named either by a bare file name, resolved against the
//! configured scripts directory, or by a path used as given. Anything that
//! contains a path separator counts as a path.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Reference to a provisioning script.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ScriptRef {
    /// Bare file name looked up in the scripts directory.
    Name(String),
    /// Relative or absolute path used unchanged.
    Path(Utf8PathBuf),
}

impl ScriptRef {
    /// Classifies `value` as a bare name or a path.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Empty`] when the value is blank.
    pub fn parse(value: &str) -> Result<Self, ScriptError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ScriptError::Empty);
        }
        if trimmed.contains('/') || trimmed.contains(std::path::MAIN_SEPARATOR) {
            Ok(Self::Path(Utf8PathBuf::from(trimmed)))
        } else {
            Ok(Self::Name(trimmed.to_owned()))
        }
    }

    /// Resolves the reference to a local path.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use dropship::scripts::ScriptRef;
    ///
    /// let dir = Utf8Path::new("/opt/scripts");
    /// let bare = ScriptRef::parse("setup.sh").expect("valid name");
    /// assert_eq!(bare.resolve(dir).as_str(), "/opt/scripts/setup.sh");
    /// ```
    #[must_use]
    pub fn resolve(&self, scripts_dir: &Utf8Path) -> Utf8PathBuf {
        match self {
            Self::Name(name) => scripts_dir.join(name),
            Self::Path(path) => path.clone(),
        }
    }
}

impl FromStr for ScriptRef {
    type Err = ScriptError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Path(path) => f.write_str(path.as_str()),
        }
    }
}

/// Read-only view of the configured scripts directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptCatalog {
    dir: Utf8PathBuf,
}

impl ScriptCatalog {
    /// Creates a catalog rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the catalog reads from.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Lists the regular files in the scripts directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Io`] when the directory cannot be opened or an
    /// entry cannot be inspected.
    pub fn list(&self) -> Result<Vec<String>, ScriptError> {
        let io_error = |err: std::io::Error| ScriptError::Io {
            path: self.dir.clone(),
            message: err.to_string(),
        };
        let dir = Dir::open_ambient_dir(&self.dir, ambient_authority()).map_err(io_error)?;

        let mut names = Vec::new();
        for item in dir.entries().map_err(io_error)? {
            let entry = item.map_err(io_error)?;
            if entry.file_type().map_err(io_error)?.is_file() {
                names.push(entry.file_name().map_err(io_error)?);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Errors raised while parsing or listing scripts.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptError {
    /// Raised when a script reference is blank.
    #[error("script reference must not be empty")]
    Empty,
    /// Raised when the scripts directory cannot be read.
    #[error("failed to read scripts directory `{path}`: {message}")]
    Io {
        /// Directory that failed to read.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
}
