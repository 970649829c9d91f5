//! Integration tests for install crate

#[cfg(test)]
mod tests {
    use async_compression::tokio::bufread::XzEncoder;
    use async_trait::async_trait;
    use dsu_broker::{
        BindNotifier, Binder, BrokerError, BrokerSettings, Identity, PrivilegedBroker,
        PrivilegedService,
    };
    use dsu_errors::{Error, InstallError};
    use dsu_events::{AppEvent, EventReceiver, InstallEvent, ProgressEvent};
    use dsu_install::*;
    use dsu_platform::{LocalBinder, LocalPrivilegedService};
    use dsu_session::{OperationKind, Preferences, Session};
    use dsu_types::{CompressionCodec, InstallationParameters};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    /// What a [`RecordingService`] does after `create-partition`
    #[derive(Clone, Copy, PartialEq)]
    enum AfterCreate {
        Nothing,
        Disconnect,
        Cancel,
    }

    /// Logs every call in `gsi_tool` argument format
    struct RecordingService {
        uid: u32,
        log: Mutex<Vec<String>>,
        data: Mutex<Vec<u8>>,
        after_create: AfterCreate,
        broker: Mutex<Option<PrivilegedBroker>>,
        cancel: CancellationToken,
    }

    impl RecordingService {
        fn new(uid: u32, after_create: AfterCreate) -> Arc<Self> {
            Arc::new(Self {
                uid,
                log: Mutex::new(Vec::new()),
                data: Mutex::new(Vec::new()),
                after_create,
                broker: Mutex::new(None),
                cancel: CancellationToken::new(),
            })
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn data(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }

        fn record(&self, line: String) {
            self.log.lock().unwrap().push(line);
        }
    }

    #[async_trait]
    impl PrivilegedService for RecordingService {
        fn identity(&self) -> Identity {
            Identity::new(self.uid)
        }

        async fn allocate_userdata(&self, size_bytes: u64) -> Result<(), Error> {
            self.record(format!("create-userdata --size {size_bytes}"));
            Ok(())
        }

        async fn create_partition(&self, name: &str, size: Option<u64>) -> Result<(), Error> {
            match size {
                Some(bytes) => self.record(format!("create-partition --name {name} --size {bytes}")),
                None => self.record(format!("create-partition --name {name}")),
            }
            match self.after_create {
                AfterCreate::Nothing => {}
                AfterCreate::Disconnect => {
                    if let Some(broker) = self.broker.lock().unwrap().as_ref() {
                        broker.notify_disconnected();
                    }
                }
                AfterCreate::Cancel => self.cancel.cancel(),
            }
            Ok(())
        }

        async fn write_chunk(&self, partition: &str, data: &[u8]) -> Result<(), Error> {
            let line = format!("write-partition --name {partition}");
            {
                let mut log = self.log.lock().unwrap();
                if log.last() != Some(&line) {
                    log.push(line);
                }
            }
            self.data.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn finalize(&self, partition: &str, activate: bool) -> Result<(), Error> {
            if activate {
                self.record(format!("finalize --name {partition} --activate"));
            } else {
                self.record(format!("finalize --name {partition}"));
            }
            Ok(())
        }
    }

    struct RecordingBinder(Arc<RecordingService>);

    impl Binder for RecordingBinder {
        fn request_bind(&self, notifier: BindNotifier) {
            notifier.connected(self.0.clone());
        }
    }

    fn broker_for(service: &Arc<RecordingService>) -> PrivilegedBroker {
        let settings = BrokerSettings::new(Duration::from_secs(5), Duration::from_millis(50));
        let broker = PrivilegedBroker::new(settings, Arc::new(RecordingBinder(service.clone())));
        *service.broker.lock().unwrap() = Some(broker.clone());
        broker
    }

    fn raw_image(len: u32) -> Vec<u8> {
        (0..len).map(|i| u8::try_from(i % 253).unwrap()).collect()
    }

    fn write_image(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Stand-in for the device tool: logs arguments, collects piped data
    fn fake_tool(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
        let log = dir.join("tool.log");
        let data = dir.join("tool.data");
        let tool = dir.join("gsi_tool");
        std::fs::write(
            &tool,
            format!(
                "#!/bin/sh\necho \"$*\" >> {}\nif [ \"$1\" = write-partition ]; then cat >> {}; fi\n",
                log.display(),
                data.display()
            ),
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (tool, log, data)
    }

    fn session(image: &Path, size: Option<u64>, prefs: Preferences) -> Session {
        let params = InstallationParameters::builder(image)
            .partition("dsu")
            .userdata_size_gib(1)
            .size(size.into())
            .build()
            .unwrap();
        Session::new(params, prefs)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(message.event);
        }
        events
    }

    #[tokio::test]
    async fn executor_and_script_issue_the_same_operations() {
        let dir = TempDir::new().unwrap();
        let raw = raw_image(10_000);
        let image = write_image(dir.path(), "system.img", &raw);
        let session = session(&image, Some(raw.len() as u64), Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Nothing);
        let broker = broker_for(&service);
        {
            let attempt = session.begin_attempt().unwrap();
            let lease = broker.acquire().await.unwrap();
            let outcome = PrivilegedInstaller::new(4096)
                .execute(&attempt, &lease)
                .await
                .unwrap();
            assert!(matches!(outcome, ExecutionOutcome::Completed(_)));
        }

        let (tool, tool_log, tool_data) = fake_tool(dir.path());
        let script = dir.path().join("install_dsu.sh");
        {
            let attempt = session.begin_attempt().unwrap();
            let generator = ScriptGenerator::new(Arc::new(GsiToolRenderer::new(
                tool.display().to_string(),
            )))
            .with_shell("/bin/sh");
            let report = generator.generate(&attempt, &script).await.unwrap();
            assert_eq!(report.commands.len(), 4);
        }
        assert_eq!(session.installation_script_path(), Some(script.as_path()));

        let status = tokio::process::Command::new("/bin/sh")
            .arg(&script)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let script_log: Vec<String> = std::fs::read_to_string(&tool_log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(script_log, service.log());
        assert_eq!(std::fs::read(&tool_data).unwrap(), service.data());
        assert_eq!(service.data(), raw);
    }

    #[tokio::test]
    async fn script_reads_dash_prefixed_relative_image_from_any_directory() {
        let dir = TempDir::new().unwrap();
        let raw = raw_image(7);
        // relative to the test's working directory, name starts with '-'
        let mut image = tempfile::Builder::new()
            .prefix("-dsu")
            .suffix(".img")
            .tempfile_in(".")
            .unwrap();
        std::io::Write::write_all(&mut image, &raw).unwrap();
        let relative = PathBuf::from(image.path().file_name().unwrap());
        assert!(relative.is_relative());
        let session = session(&relative, None, Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Nothing);
        let broker = broker_for(&service);
        {
            let attempt = session.begin_attempt().unwrap();
            let lease = broker.acquire().await.unwrap();
            let outcome = PrivilegedInstaller::new(4096)
                .execute(&attempt, &lease)
                .await
                .unwrap();
            assert!(matches!(outcome, ExecutionOutcome::Completed(_)));
        }
        assert_eq!(service.data(), raw);

        let (tool, tool_log, tool_data) = fake_tool(dir.path());
        let script = dir.path().join("install_dsu.sh");
        {
            let attempt = session.begin_attempt().unwrap();
            let generator = ScriptGenerator::new(Arc::new(GsiToolRenderer::new(
                tool.display().to_string(),
            )));
            generator.generate(&attempt, &script).await.unwrap();
        }

        let status = tokio::process::Command::new("/bin/sh")
            .arg(&script)
            .current_dir(dir.path())
            .status()
            .await
            .unwrap();
        assert!(status.success());
        assert_eq!(std::fs::read(&tool_data).unwrap(), raw);
        let script_log: Vec<String> = std::fs::read_to_string(&tool_log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(script_log, service.log());
    }

    #[tokio::test]
    async fn xz_image_of_unknown_size_streams_without_fraction() {
        let dir = TempDir::new().unwrap();
        let raw = raw_image(50_000);
        let mut compressed = Vec::new();
        XzEncoder::new(&raw[..])
            .read_to_end(&mut compressed)
            .await
            .unwrap();
        let image = write_image(dir.path(), "system.img.xz", &compressed);
        let session = session(&image, None, Preferences::new());
        assert_eq!(session.parameters().codec(), CompressionCodec::Xz);

        let service = RecordingService::new(0, AfterCreate::Nothing);
        let broker = broker_for(&service);
        let (tx, mut rx) = dsu_events::channel();

        let attempt = session.begin_attempt().unwrap();
        let lease = broker.acquire().await.unwrap();
        let outcome = PrivilegedInstaller::new(16 * 1024)
            .with_event_sender(tx)
            .execute(&attempt, &lease)
            .await
            .unwrap();

        let ExecutionOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.bytes_written, raw.len() as u64);
        assert_eq!(report.kinds(), OperationKind::ORDER.to_vec());
        assert_eq!(service.data(), raw);
        assert_eq!(service.log()[1], "create-partition --name dsu");

        let updates: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                AppEvent::Progress(ProgressEvent::Updated {
                    bytes_done,
                    bytes_total,
                    fraction,
                    ..
                }) => Some((bytes_done, bytes_total, fraction)),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 4);
        assert!(updates
            .iter()
            .all(|(_, total, fraction)| total.is_none() && fraction.is_none()));
        assert_eq!(updates.last().map(|u| u.0), Some(raw.len() as u64));
    }

    #[tokio::test]
    async fn drop_after_create_partition_fails_the_stream_write() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(8192));
        let session = session(&image, None, Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Disconnect);
        let broker = broker_for(&service);
        let (tx, mut rx) = dsu_events::channel();

        let attempt = session.begin_attempt().unwrap();
        let lease = broker.acquire().await.unwrap();
        let err = PrivilegedInstaller::new(1024)
            .with_event_sender(tx)
            .execute(&attempt, &lease)
            .await
            .unwrap_err();

        match err {
            Error::Install(InstallError::ExecutionFailed {
                last_completed,
                failed,
                ..
            }) => {
                assert_eq!(last_completed.as_deref(), Some("create-partition"));
                assert_eq!(failed, "stream-write");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(service.data().is_empty());
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            AppEvent::Install(InstallEvent::Failed { .. })
        )));
    }

    #[tokio::test]
    async fn cancel_between_operations_stops_before_writing() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(8192));
        let session = session(&image, None, Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Cancel);
        let broker = broker_for(&service);

        let attempt = session.begin_attempt().unwrap();
        let lease = broker.acquire().await.unwrap();
        let outcome = PrivilegedInstaller::new(1024)
            .with_cancellation(service.cancel.clone())
            .execute(&attempt, &lease)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::Cancelled {
                last_completed: Some(OperationKind::CreatePartition)
            }
        ));
        assert!(service.data().is_empty());
        assert_eq!(service.log().len(), 2);
    }

    #[tokio::test]
    async fn stale_lease_applies_nothing() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(1024));
        let session = session(&image, None, Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Nothing);
        let broker = broker_for(&service);

        let attempt = session.begin_attempt().unwrap();
        let lease = broker.acquire().await.unwrap();
        broker.notify_disconnected();

        let err = PrivilegedInstaller::new(1024)
            .execute(&attempt, &lease)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Broker(BrokerError::StaleConnection { .. })
        ));
        assert!(service.log().is_empty());
    }

    #[tokio::test]
    async fn forced_script_skips_the_broker() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img.gz", b"not read");
        let session = session(&image, None, Preferences::new());

        let service = RecordingService::new(0, AfterCreate::Nothing);
        let broker = broker_for(&service);
        let output = dir.path().join("out").join("install_dsu.sh");
        let installer = Installer::new(InstallConfig::default(), broker.clone());
        let ctx = InstallContext::new()
            .with_force_script(true)
            .with_output(Some(output.clone()));

        let outcome = installer.install(&session, &ctx).await.unwrap();
        let InstallOutcome::Script(report) = outcome else {
            panic!("expected a script");
        };
        assert_eq!(report.path, output);
        assert_eq!(broker.bind_attempts(), 0);
        assert!(!session.is_in_progress());

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("gzip -dc"));

        // one script per session
        let err = installer.install(&session, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Plan(dsu_errors::PlanError::ScriptPathAlreadyRecorded { .. })
        ));
    }

    #[tokio::test]
    async fn unprivileged_executor_is_refused_without_fallback() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(1024));
        let session = session(&image, None, Preferences::new());

        let service = RecordingService::new(1000, AfterCreate::Nothing);
        let installer = Installer::new(InstallConfig::default(), broker_for(&service));

        let err = installer
            .install(&session, &InstallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Broker(BrokerError::NotPrivileged { uid: 1000 })
        ));
        assert!(service.log().is_empty());
    }

    #[tokio::test]
    async fn unprivileged_executor_falls_back_to_script() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(1024));
        let prefs = Preferences::new().with(Preferences::SCRIPT_FALLBACK, "true");
        let session = session(&image, None, prefs);

        let service = RecordingService::new(1000, AfterCreate::Nothing);
        let config = InstallConfig::default().with_script_path(dir.path().join("fallback.sh"));
        let installer = Installer::new(config, broker_for(&service));
        let (tx, mut rx) = dsu_events::channel();

        let outcome = installer
            .install(&session, &InstallContext::new().with_event_sender(tx))
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::Script(_)));
        assert!(dir.path().join("fallback.sh").exists());
        assert!(service.log().is_empty());

        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            AppEvent::Install(InstallEvent::Completed {
                mode: dsu_types::InstallMode::Script,
                ..
            })
        )));
    }

    /// Never answers a bind request
    struct SilentBinder;

    impl Binder for SilentBinder {
        fn request_bind(&self, _notifier: BindNotifier) {}
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_connection() {
        let dir = TempDir::new().unwrap();
        let image = write_image(dir.path(), "system.img", &raw_image(1024));
        let session = session(&image, None, Preferences::new());

        let settings = BrokerSettings::new(Duration::from_secs(20), Duration::from_millis(50));
        let broker = PrivilegedBroker::new(settings, Arc::new(SilentBinder));
        let installer = Installer::new(InstallConfig::default(), broker.clone());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = dsu_events::channel();

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            }
        });

        let started = std::time::Instant::now();
        let outcome = installer
            .install(
                &session,
                &InstallContext::new().with_cancel(cancel).with_event_sender(tx),
            )
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            outcome,
            InstallOutcome::Cancelled {
                last_completed: None
            }
        ));
        assert!(!session.is_in_progress());
        assert!(!broker.is_connected());

        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            AppEvent::Install(InstallEvent::Cancelled { last_completed: None, .. })
        )));
    }

    #[tokio::test]
    async fn privileged_install_through_local_service() {
        let dir = TempDir::new().unwrap();
        let raw = raw_image(20_000);
        let image = write_image(dir.path(), "system.img", &raw);
        let session = session(&image, Some(raw.len() as u64), Preferences::new());

        let local = Arc::new(LocalPrivilegedService::with_identity(
            dir.path().join("dsu"),
            Identity::ROOT,
        ));
        let broker = PrivilegedBroker::new(
            BrokerSettings::default(),
            Arc::new(LocalBinder::new(local.clone())),
        );
        let installer = Installer::new(InstallConfig::default().with_chunk_size(4096), broker);

        let outcome = installer
            .install(&session, &InstallContext::new())
            .await
            .unwrap();
        let InstallOutcome::Installed(report) = outcome else {
            panic!("expected a privileged install");
        };
        assert_eq!(report.bytes_written, raw.len() as u64);
        assert_eq!(report.session_id, session.id());
        assert_eq!(std::fs::read(local.partition_path("dsu")).unwrap(), raw);
        assert!(local.completion_marker("dsu").exists());
        assert_eq!(std::fs::read_to_string(local.active_path()).unwrap(), "dsu");
    }
}
