//! Operation-sequence derivation shared by every installation path
//!
//! The privileged executor and the script generator both consume an
//! [`OperationSequence`]; neither looks at raw parameters to decide what to
//! do. Keeping the derivation here is what keeps the two paths identical.

use dsu_types::{CompressionCodec, ImageSize, InstallationParameters, PartitionName};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::preferences::Preferences;

/// Stable name of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    AllocateUserdata,
    CreatePartition,
    StreamWrite,
    Finalize,
}

impl OperationKind {
    /// Every kind, in the order a sequence issues them
    pub const ORDER: [Self; 4] = [
        Self::AllocateUserdata,
        Self::CreatePartition,
        Self::StreamWrite,
        Self::Finalize,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllocateUserdata => "allocate-userdata",
            Self::CreatePartition => "create-partition",
            Self::StreamWrite => "stream-write",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step against the privileged executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    AllocateUserdata {
        size_gib: u32,
    },
    CreatePartition {
        name: PartitionName,
        size: ImageSize,
    },
    /// Decompression is a transform on this step's input, not a step of its own
    StreamWrite {
        partition: PartitionName,
        source: PathBuf,
        codec: CompressionCodec,
    },
    Finalize {
        partition: PartitionName,
        activate: bool,
    },
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::AllocateUserdata { .. } => OperationKind::AllocateUserdata,
            Self::CreatePartition { .. } => OperationKind::CreatePartition,
            Self::StreamWrite { .. } => OperationKind::StreamWrite,
            Self::Finalize { .. } => OperationKind::Finalize,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocateUserdata { size_gib } => write!(f, "allocate {size_gib} GiB userdata"),
            Self::CreatePartition { name, size } => match size {
                ImageSize::Known(bytes) => write!(f, "create partition {name} ({bytes} bytes)"),
                ImageSize::Unknown => write!(f, "create partition {name} (size unknown)"),
            },
            Self::StreamWrite {
                partition,
                source,
                codec,
            } => write!(
                f,
                "write {} into {partition} (codec {codec})",
                source.display()
            ),
            Self::Finalize {
                partition,
                activate,
            } => {
                if *activate {
                    write!(f, "finalize {partition} and activate")
                } else {
                    write!(f, "finalize {partition}")
                }
            }
        }
    }
}

/// Ordered operations for one installation
///
/// Only [`derive_operation_sequence`] builds one, so a partial sequence
/// cannot exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSequence {
    partition: PartitionName,
    image_size: ImageSize,
    operations: Vec<Operation>,
}

impl OperationSequence {
    #[must_use]
    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    /// Declared image size the stream-write step is measured against
    #[must_use]
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(Operation::kind).collect()
    }
}

impl<'a> IntoIterator for &'a OperationSequence {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Derive the canonical operation sequence
///
/// Always four operations in the same order, whatever the codec or image
/// size. Parameters are validated on construction, so this cannot fail.
#[must_use]
pub fn derive_operation_sequence(
    params: &InstallationParameters,
    preferences: &Preferences,
) -> OperationSequence {
    let partition = params.partition().clone();
    let image = params.image();

    let operations = vec![
        Operation::AllocateUserdata {
            size_gib: params.userdata_size_gib(),
        },
        Operation::CreatePartition {
            name: partition.clone(),
            size: image.size,
        },
        Operation::StreamWrite {
            partition: partition.clone(),
            source: image.path.clone(),
            codec: params.codec(),
        },
        Operation::Finalize {
            partition: partition.clone(),
            activate: preferences.finalize_activate(),
        },
    ];

    OperationSequence {
        partition,
        image_size: image.size,
        operations,
    }
}
