use serde::{Deserialize, Serialize};

/// Byte-level progress of a streaming operation
///
/// `bytes_total` is `None` when the image size is unknown; consumers then only
/// have the running byte count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    Started {
        operation: String,
        bytes_total: Option<u64>,
    },

    Updated {
        operation: String,
        bytes_done: u64,
        bytes_total: Option<u64>,
        fraction: Option<f64>,
    },

    Completed {
        operation: String,
        bytes_done: u64,
    },
}

impl ProgressEvent {
    /// Create an update event, computing the fraction when the total is known
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn updated(operation: impl Into<String>, bytes_done: u64, bytes_total: Option<u64>) -> Self {
        let fraction = bytes_total.map(|total| {
            if total == 0 {
                1.0
            } else {
                (bytes_done as f64 / total as f64).min(1.0)
            }
        });
        Self::Updated {
            operation: operation.into(),
            bytes_done,
            bytes_total,
            fraction,
        }
    }
}
