//! Image source description and compression codecs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Declared length of an image stream
///
/// `Unknown` is a distinct state, not a zero length: a zero-byte image is
/// `Known(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "bytes")]
pub enum ImageSize {
    Known(u64),
    Unknown,
}

impl ImageSize {
    /// Byte count when known
    #[must_use]
    pub fn bytes(self) -> Option<u64> {
        match self {
            Self::Known(bytes) => Some(bytes),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<Option<u64>> for ImageSize {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(bytes) => write!(f, "{bytes}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Compression applied to the image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    #[default]
    None,
    Xz,
    Gzip,
    Zstd,
}

impl CompressionCodec {
    pub const ALL: [Self; 4] = [Self::None, Self::Xz, Self::Gzip, Self::Zstd];

    /// Detect the codec from the file extension; unknown extensions are raw
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("xz") => Self::Xz,
            Some("gz" | "gzip") => Self::Gzip,
            Some("zst" | "zstd") => Self::Zstd,
            _ => Self::None,
        }
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xz => "xz",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionCodec {
    type Err = dsu_errors::PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Self::None),
            "xz" => Ok(Self::Xz),
            "gz" | "gzip" => Ok(Self::Gzip),
            "zst" | "zstd" => Ok(Self::Zstd),
            other => Err(dsu_errors::PlanError::invalid(
                "codec",
                format!("unsupported compression codec '{other}'"),
            )),
        }
    }
}

impl clap::ValueEnum for CompressionCodec {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Readable image stream plus its declared length
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSource {
    pub path: PathBuf,
    pub size: ImageSize,
}

impl ImageSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: ImageSize) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_detection() {
        assert_eq!(
            CompressionCodec::from_path(Path::new("system.img.xz")),
            CompressionCodec::Xz
        );
        assert_eq!(
            CompressionCodec::from_path(Path::new("system.img.GZ")),
            CompressionCodec::Gzip
        );
        assert_eq!(
            CompressionCodec::from_path(Path::new("system.img.zst")),
            CompressionCodec::Zstd
        );
        assert_eq!(
            CompressionCodec::from_path(Path::new("system.img")),
            CompressionCodec::None
        );
    }

    #[test]
    fn test_unknown_size_is_not_zero() {
        assert_ne!(ImageSize::Unknown, ImageSize::Known(0));
        assert_eq!(ImageSize::from(None), ImageSize::Unknown);
    }

    #[test]
    fn test_codec_parse() {
        assert_eq!("XZ".parse::<CompressionCodec>().unwrap(), CompressionCodec::Xz);
        assert!("lz4".parse::<CompressionCodec>().is_err());
    }
}
