//! Provisioning requests: what to create and how to configure it.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::cloud::CreateDroplet;
use crate::scripts::{ScriptError, ScriptRef};

/// One local directory to mirror onto the droplet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FolderSync {
    source: Utf8PathBuf,
    destination: String,
}

impl FolderSync {
    /// Creates a sync pair, trimming both sides.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidSync`] when either side is blank.
    pub fn new(source: &str, destination: &str) -> Result<Self, RequestError> {
        let source_trimmed = source.trim();
        let destination_trimmed = destination.trim();
        if source_trimmed.is_empty() || destination_trimmed.is_empty() {
            return Err(RequestError::InvalidSync(format!("{source}:{destination}")));
        }
        Ok(Self {
            source: Utf8PathBuf::from(source_trimmed),
            destination: destination_trimmed.to_owned(),
        })
    }

    /// Parses `SOURCE:DESTINATION`, splitting on the first colon.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidSync`] when the colon is missing or
    /// either side is blank.
    pub fn parse(value: &str) -> Result<Self, RequestError> {
        let (source, destination) = value
            .split_once(':')
            .ok_or_else(|| RequestError::InvalidSync(value.to_owned()))?;
        Self::new(source, destination)
    }

    /// Local directory to mirror.
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Remote directory receiving the mirror.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl FromStr for FolderSync {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for FolderSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.destination)
    }
}

/// Immutable description of one droplet to create and configure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisioningRequest {
    name: String,
    size: String,
    image: String,
    region: String,
    private_networking: bool,
    folders: Vec<FolderSync>,
    scripts: Vec<ScriptRef>,
}

impl ProvisioningRequest {
    /// Starts a builder for a [`ProvisioningRequest`].
    #[must_use]
    pub fn builder() -> ProvisioningRequestBuilder {
        ProvisioningRequestBuilder::new()
    }

    /// Desired droplet name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size slug.
    #[must_use]
    pub fn size(&self) -> &str {
        &self.size
    }

    /// Image slug or id.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Region slug.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether the droplet joins the private network.
    #[must_use]
    pub const fn private_networking(&self) -> bool {
        self.private_networking
    }

    /// Folder syncs, in execution order.
    #[must_use]
    pub fn folders(&self) -> &[FolderSync] {
        &self.folders
    }

    /// Scripts, in execution order.
    #[must_use]
    pub fn scripts(&self) -> &[ScriptRef] {
        &self.scripts
    }

    /// Builds the provider create call for this request.
    #[must_use]
    pub fn create_call(&self, ssh_key_id: &str) -> CreateDroplet {
        CreateDroplet {
            name: self.name.clone(),
            size: self.size.clone(),
            image: self.image.clone(),
            region: self.region.clone(),
            private_networking: self.private_networking,
            ssh_keys: vec![ssh_key_id.to_owned()],
        }
    }
}

/// Builder for [`ProvisioningRequest`] that defers trimming and validation
/// to construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisioningRequestBuilder {
    name: String,
    size: String,
    image: String,
    region: String,
    private_networking: bool,
    folders: Vec<FolderSync>,
    scripts: Vec<ScriptRef>,
}

impl ProvisioningRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the droplet name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the size slug.
    #[must_use]
    pub fn size(mut self, value: impl Into<String>) -> Self {
        self.size = value.into();
        self
    }

    /// Sets the image slug or id.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the region slug.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Enables or disables private networking.
    #[must_use]
    pub const fn private_networking(mut self, enabled: bool) -> Self {
        self.private_networking = enabled;
        self
    }

    /// Appends a folder sync.
    #[must_use]
    pub fn folder(mut self, sync: FolderSync) -> Self {
        self.folders.push(sync);
        self
    }

    /// Appends several folder syncs.
    #[must_use]
    pub fn folders(mut self, syncs: impl IntoIterator<Item = FolderSync>) -> Self {
        self.folders.extend(syncs);
        self
    }

    /// Appends a script.
    #[must_use]
    pub fn script(mut self, script: ScriptRef) -> Self {
        self.scripts.push(script);
        self
    }

    /// Appends several scripts.
    #[must_use]
    pub fn scripts(mut self, scripts: impl IntoIterator<Item = ScriptRef>) -> Self {
        self.scripts.extend(scripts);
        self
    }

    /// Builds and validates the request, trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] naming the first empty field.
    pub fn build(self) -> Result<ProvisioningRequest, RequestError> {
        let request = ProvisioningRequest {
            name: self.name.trim().to_owned(),
            size: self.size.trim().to_owned(),
            image: self.image.trim().to_owned(),
            region: self.region.trim().to_owned(),
            private_networking: self.private_networking,
            folders: self.folders,
            scripts: self.scripts,
        };
        for (field, value) in [
            ("name", &request.name),
            ("size", &request.size),
            ("image", &request.image),
            ("region", &request.region),
        ] {
            if value.is_empty() {
                return Err(RequestError::Validation(field.to_owned()));
            }
        }
        Ok(request)
    }
}

/// Errors raised while assembling a request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required field is empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a folder sync is not of the form `SOURCE:DESTINATION`.
    #[error("invalid folder sync `{0}`: expected SOURCE:DESTINATION")]
    InvalidSync(String),
    /// Raised when a script reference is invalid.
    #[error(transparent)]
    Script(#[from] ScriptError),
}
