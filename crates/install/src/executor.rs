//! Privileged installation executor
//!
//! Issues an attempt's operation sequence, in order, over a leased
//! connection. Nothing already applied is rolled back: on failure the caller
//! learns which operation was the last to complete and decides what to do
//! with the partial state.

use dsu_broker::{ConnectionHandle, ConnectionLease};
use dsu_errors::{Error, InstallError, UserFacingError};
use dsu_events::{AppEvent, EventEmitter, EventSender, FailureContext, InstallEvent, ProgressEvent};
use dsu_session::{Attempt, Operation, OperationKind};
use dsu_types::{CompressionCodec, ImageSize, InstallMode, PartitionName, GIB};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::result::{ExecutionOutcome, InstallReport, OperationRecord};
use crate::emit::SessionEmitter;
use crate::stream;

/// Outcome of one applied operation
enum Applied {
    Done { bytes: u64 },
    Cancelled,
}

/// Executes operation sequences against the privileged service
#[derive(Debug, Clone)]
pub struct PrivilegedInstaller {
    chunk_size: usize,
    cancel: CancellationToken,
    event_sender: Option<EventSender>,
}

impl PrivilegedInstaller {
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cancel: CancellationToken::new(),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every operation of `attempt` over `lease`
    ///
    /// # Errors
    ///
    /// - `BrokerError::StaleConnection` if the lease is already dead; nothing
    ///   has been applied in that case.
    /// - `InstallError::ExecutionFailed` if an operation fails or the
    ///   connection drops mid-sequence.
    pub async fn execute(
        &self,
        attempt: &Attempt<'_>,
        lease: &ConnectionLease,
    ) -> Result<ExecutionOutcome, Error> {
        let emitter = SessionEmitter::new(self.event_sender.as_ref(), attempt.session_id());
        let sequence = attempt.sequence();
        let partition = sequence.partition().to_string();

        lease.service()?;

        emitter.emit(AppEvent::Install(InstallEvent::Started {
            partition: partition.clone(),
            mode: InstallMode::Privileged,
            operations: sequence.len(),
        }));

        let started = Instant::now();
        let mut records = Vec::with_capacity(sequence.len());
        let mut last_completed: Option<OperationKind> = None;
        let mut bytes_written = 0;

        for (index, operation) in sequence.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(cancelled(&emitter, partition, last_completed));
            }

            let kind = operation.kind();
            emitter.emit(AppEvent::Install(InstallEvent::OperationStarted {
                index,
                operation: kind.as_str().to_string(),
                detail: operation.to_string(),
            }));

            let op_started = Instant::now();
            match self
                .apply(&emitter, lease.handle(), operation, sequence.image_size())
                .await
            {
                Ok(Applied::Done { bytes }) => {
                    let duration = op_started.elapsed();
                    bytes_written += bytes;
                    last_completed = Some(kind);
                    records.push(OperationRecord {
                        index,
                        kind,
                        duration,
                    });
                    emitter.emit(AppEvent::Install(InstallEvent::OperationCompleted {
                        index,
                        operation: kind.as_str().to_string(),
                        duration,
                    }));
                }
                Ok(Applied::Cancelled) => {
                    return Ok(cancelled(&emitter, partition, last_completed));
                }
                Err(cause) => {
                    return Err(failed(&emitter, partition, last_completed, kind, &cause));
                }
            }
        }

        let duration = started.elapsed();
        emitter.emit(AppEvent::Install(InstallEvent::Completed {
            partition: partition.clone(),
            mode: InstallMode::Privileged,
            bytes_written,
            duration,
        }));

        Ok(ExecutionOutcome::Completed(InstallReport {
            session_id: attempt.session_id(),
            partition,
            operations: records,
            bytes_written,
            duration,
        }))
    }

    async fn apply(
        &self,
        emitter: &SessionEmitter<'_>,
        handle: &ConnectionHandle,
        operation: &Operation,
        image_size: ImageSize,
    ) -> Result<Applied, Error> {
        match operation {
            Operation::AllocateUserdata { size_gib } => {
                let service = handle.service()?;
                service
                    .allocate_userdata(u64::from(*size_gib) * GIB)
                    .await?;
            }
            Operation::CreatePartition { name, size } => {
                let service = handle.service()?;
                service.create_partition(name.as_str(), size.bytes()).await?;
            }
            Operation::StreamWrite {
                partition,
                source,
                codec,
            } => {
                return self
                    .stream_write(emitter, handle, partition, source, *codec, image_size)
                    .await;
            }
            Operation::Finalize {
                partition,
                activate,
            } => {
                let service = handle.service()?;
                service.finalize(partition.as_str(), *activate).await?;
            }
        }
        Ok(Applied::Done { bytes: 0 })
    }

    async fn stream_write(
        &self,
        emitter: &SessionEmitter<'_>,
        handle: &ConnectionHandle,
        partition: &PartitionName,
        source: &Path,
        codec: CompressionCodec,
        image_size: ImageSize,
    ) -> Result<Applied, Error> {
        let operation = OperationKind::StreamWrite.as_str();
        let bytes_total = image_size.bytes();
        let mut reader = stream::open_image(source, codec).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes_done: u64 = 0;

        emitter.emit(AppEvent::Progress(ProgressEvent::Started {
            operation: operation.to_string(),
            bytes_total,
        }));

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Applied::Cancelled);
            }
            let filled = stream::read_chunk(&mut reader, &mut buf, source).await?;
            if filled == 0 {
                break;
            }

            // re-checked per chunk so a drop surfaces before the next write
            let service = handle.service()?;
            service
                .write_chunk(partition.as_str(), &buf[..filled])
                .await?;

            bytes_done += filled as u64;
            emitter.emit_progress_updated(operation, bytes_done, bytes_total);
        }

        emitter.emit(AppEvent::Progress(ProgressEvent::Completed {
            operation: operation.to_string(),
            bytes_done,
        }));
        Ok(Applied::Done { bytes: bytes_done })
    }
}

fn cancelled(
    emitter: &SessionEmitter<'_>,
    partition: String,
    last_completed: Option<OperationKind>,
) -> ExecutionOutcome {
    tracing::debug!(%partition, last_completed = ?last_completed, "installation cancelled");
    emitter.emit(AppEvent::Install(InstallEvent::Cancelled {
        partition,
        last_completed: last_completed.map(|kind| kind.as_str().to_string()),
    }));
    ExecutionOutcome::Cancelled { last_completed }
}

fn failed(
    emitter: &SessionEmitter<'_>,
    partition: String,
    last_completed: Option<OperationKind>,
    failed: OperationKind,
    cause: &Error,
) -> Error {
    let error = InstallError::ExecutionFailed {
        partition: partition.clone(),
        last_completed: last_completed.map(|kind| kind.as_str().to_string()),
        failed: failed.as_str().to_string(),
        cause: cause.user_message().into_owned(),
        retryable: cause.is_retryable(),
    };
    emitter.emit(AppEvent::Install(InstallEvent::Failed {
        partition,
        last_completed: last_completed.map(|kind| kind.as_str().to_string()),
        failure: FailureContext::from_error(&error),
    }));
    error.into()
}
