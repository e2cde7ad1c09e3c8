//! Configuration loading via `ortho-config`.
//!
//! Two layered structures are exposed: [`ProviderConfig`] for the cloud API
//! and orchestration settings, and [`TransportConfig`] for the `scp`, `ssh`
//! and `rsync` invocations. Both merge defaults, `dropship.toml` and
//! environment variables, and both are validated before use so missing
//! settings fail fast with a message naming the variable to set.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default DigitalOcean API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.digitalocean.com/v2";

/// Default number of droplet pipelines allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Cloud provider and orchestration settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DROPSHIP",
    discovery(
        app_name = "dropship",
        env_var = "DROPSHIP_CONFIG_PATH",
        config_file_name = "dropship.toml",
        dotfile_name = ".dropship.toml",
        project_file_name = "dropship.toml"
    )
)]
pub struct ProviderConfig {
    /// Client identifier issued alongside the API key. It is sent in the
    /// `User-Agent` header so provider-side audit logs can attribute calls.
    pub client_id: String,
    /// API key used as the bearer token for every request.
    pub api_key: String,
    /// Directory holding provisioning scripts referenced by bare name.
    pub scripts_dir: String,
    /// Identifier (or fingerprint) of the SSH key pre-registered with the
    /// provider. It is injected into every new droplet.
    pub ssh_key_id: String,
    /// Whether the binary installs a log subscriber.
    #[ortho_config(default = true)]
    pub logging: bool,
    /// Base URL of the provider API.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base: String,
    /// Maximum number of droplet pipelines or destroys in flight at once.
    #[ortho_config(default = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

/// Secure transport settings shared by `scp`, `ssh` and `rsync`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DROPSHIP_SSH",
    discovery(
        app_name = "dropship",
        env_var = "DROPSHIP_CONFIG_PATH",
        config_file_name = "dropship.toml",
        dotfile_name = ".dropship.toml",
        project_file_name = "dropship.toml"
    )
)]
pub struct TransportConfig {
    /// Private key matching the provider-registered public key. Supports
    /// tilde expansion.
    pub private_key_path: String,
    /// Public half of the key pair. Supports tilde expansion.
    pub public_key_path: String,
    /// Remote login user.
    #[ortho_config(default = "root".to_owned())]
    pub user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `rsync` executable.
    #[ortho_config(default = "rsync".to_owned())]
    pub rsync_bin: String,
    /// Known hosts file handed to the SSH client. Freshly created droplets
    /// reuse addresses, so the default discards host keys.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in dropship.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl ProviderConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("dropship")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::InvalidValue`] when the concurrency limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.client_id,
            &FieldMetadata::new(
                "API client identifier",
                "DROPSHIP_CLIENT_ID",
                "client_id",
                "provider",
            ),
        )?;
        require_field(
            &self.api_key,
            &FieldMetadata::new("API key", "DROPSHIP_API_KEY", "api_key", "provider"),
        )?;
        require_field(
            &self.scripts_dir,
            &FieldMetadata::new(
                "scripts directory",
                "DROPSHIP_SCRIPTS_DIR",
                "scripts_dir",
                "provider",
            ),
        )?;
        require_field(
            &self.ssh_key_id,
            &FieldMetadata::new(
                "registered SSH key identifier",
                "DROPSHIP_SSH_KEY_ID",
                "ssh_key_id",
                "provider",
            ),
        )?;
        require_field(
            &self.api_base,
            &FieldMetadata::new("API base URL", "DROPSHIP_API_BASE", "api_base", "provider"),
        )?;
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "concurrency must be at least 1 (DROPSHIP_CONCURRENCY)",
            )));
        }
        Ok(())
    }

    /// Returns the scripts directory with a leading `~/` expanded.
    #[must_use]
    pub fn scripts_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(self.scripts_dir.trim()))
    }
}

impl TransportConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("dropship")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures every value the transport relies on is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when any required field is
    /// blank, or [`ConfigError::InvalidValue`] when the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.private_key_path,
            &FieldMetadata::new(
                "SSH private key path",
                "DROPSHIP_SSH_PRIVATE_KEY_PATH",
                "private_key_path",
                "ssh",
            ),
        )?;
        require_field(
            &self.public_key_path,
            &FieldMetadata::new(
                "SSH public key path",
                "DROPSHIP_SSH_PUBLIC_KEY_PATH",
                "public_key_path",
                "ssh",
            ),
        )?;
        require_field(
            &self.user,
            &FieldMetadata::new("SSH user", "DROPSHIP_SSH_USER", "user", "ssh"),
        )?;
        require_field(
            &self.scp_bin,
            &FieldMetadata::new("scp binary", "DROPSHIP_SSH_SCP_BIN", "scp_bin", "ssh"),
        )?;
        require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh binary", "DROPSHIP_SSH_SSH_BIN", "ssh_bin", "ssh"),
        )?;
        require_field(
            &self.rsync_bin,
            &FieldMetadata::new("rsync binary", "DROPSHIP_SSH_RSYNC_BIN", "rsync_bin", "ssh"),
        )?;
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "port must be non-zero (DROPSHIP_SSH_PORT)",
            )));
        }
        Ok(())
    }

    /// Private key path with a leading `~/` expanded.
    #[must_use]
    pub fn private_key(&self) -> String {
        expand_tilde(self.private_key_path.trim())
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use dropship::config::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests;
