//! Validated installation parameters

use dsu_errors::PlanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::image::{CompressionCodec, ImageSize, ImageSource};

/// Bytes in one gibibyte
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Name of the dynamic partition the image is written to
///
/// Restricted to ASCII alphanumerics, `_` and `-` since the name ends up in
/// generated shell commands and on-device file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PartitionName(String);

impl PartitionName {
    /// Validate and wrap a partition name
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidParameters` for an empty name or a name with
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, PlanError> {
        let name = name.into();
        if name.is_empty() {
            return Err(PlanError::invalid("partition", "must not be empty"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(PlanError::invalid(
                "partition",
                format!("character '{bad}' is not allowed"),
            ));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PartitionName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Unvalidated installation request, as received from a front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRequest {
    pub image: PathBuf,
    #[serde(default)]
    pub image_size: Option<u64>,
    pub partition: String,
    pub userdata_size_gib: u32,
    /// Detected from the image extension when absent
    #[serde(default)]
    pub codec: Option<CompressionCodec>,
}

/// Validated description of one installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationParameters {
    image: ImageSource,
    partition: PartitionName,
    userdata_size_gib: u32,
    codec: CompressionCodec,
}

impl InstallationParameters {
    /// Start building parameters for the given image
    #[must_use]
    pub fn builder(image: impl Into<PathBuf>) -> InstallationParametersBuilder {
        InstallationParametersBuilder::new(image)
    }

    #[must_use]
    pub fn image(&self) -> &ImageSource {
        &self.image
    }

    #[must_use]
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    #[must_use]
    pub fn userdata_size_gib(&self) -> u32 {
        self.userdata_size_gib
    }

    #[must_use]
    pub fn userdata_size_bytes(&self) -> u64 {
        u64::from(self.userdata_size_gib) * GIB
    }

    #[must_use]
    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }
}

impl TryFrom<InstallationRequest> for InstallationParameters {
    type Error = PlanError;

    fn try_from(request: InstallationRequest) -> Result<Self, Self::Error> {
        let mut builder = Self::builder(request.image)
            .partition(request.partition)
            .userdata_size_gib(request.userdata_size_gib)
            .size(request.image_size.into());
        if let Some(codec) = request.codec {
            builder = builder.codec(codec);
        }
        builder.build()
    }
}

/// Builder for [`InstallationParameters`]; validation happens in `build`
#[derive(Debug, Clone)]
pub struct InstallationParametersBuilder {
    image: PathBuf,
    size: ImageSize,
    partition: Option<String>,
    userdata_size_gib: u32,
    codec: Option<CompressionCodec>,
}

impl InstallationParametersBuilder {
    fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            size: ImageSize::Unknown,
            partition: None,
            userdata_size_gib: 0,
            codec: None,
        }
    }

    #[must_use]
    pub fn size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn partition(mut self, name: impl Into<String>) -> Self {
        self.partition = Some(name.into());
        self
    }

    #[must_use]
    pub fn userdata_size_gib(mut self, gib: u32) -> Self {
        self.userdata_size_gib = gib;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validate and produce the parameters
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidParameters` naming the first offending
    /// field: `image`, `partition` or `userdata_size_gib`. The image path
    /// must be valid UTF-8; relative paths are resolved against the current
    /// directory.
    pub fn build(self) -> Result<InstallationParameters, PlanError> {
        let image = resolve_image_path(&self.image)?;
        let partition = PartitionName::new(self.partition.unwrap_or_default())?;
        if self.userdata_size_gib == 0 {
            return Err(PlanError::invalid(
                "userdata_size_gib",
                "must be greater than zero",
            ));
        }
        let codec = self
            .codec
            .unwrap_or_else(|| CompressionCodec::from_path(&image));

        Ok(InstallationParameters {
            image: ImageSource::new(image, self.size),
            partition,
            userdata_size_gib: self.userdata_size_gib,
            codec,
        })
    }
}

/// Absolute, UTF-8 form of the image path, as rendered into scripts
fn resolve_image_path(image: &Path) -> Result<PathBuf, PlanError> {
    if image.as_os_str().is_empty() {
        return Err(PlanError::invalid("image", "path must not be empty"));
    }
    if image.to_str().is_none() {
        return Err(PlanError::invalid("image", "path must be valid UTF-8"));
    }
    std::path::absolute(image)
        .map_err(|e| PlanError::invalid("image", format!("cannot resolve path: {e}")))
}
