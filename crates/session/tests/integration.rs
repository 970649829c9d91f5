//! Integration tests for session

#[cfg(test)]
mod tests {
    use dsu_errors::PlanError;
    use dsu_session::*;
    use dsu_types::{
        CompressionCodec, ImageSize, InstallationParameters, InstallationRequest, PartitionName,
    };
    use std::path::PathBuf;
    use std::sync::Barrier;

    #[test]
    fn test_compressed_image_of_unknown_size() {
        let request = InstallationRequest {
            image: PathBuf::from("/sdcard/Download/system.img.xz"),
            image_size: None,
            partition: "dsu".to_string(),
            userdata_size_gib: 4,
            codec: None,
        };
        let params = InstallationParameters::try_from(request).unwrap();
        let session = Session::new(params, Preferences::new());
        let attempt = session.begin_attempt().unwrap();

        let dsu = PartitionName::new("dsu").unwrap();
        assert_eq!(
            attempt.sequence().operations(),
            &[
                Operation::AllocateUserdata { size_gib: 4 },
                Operation::CreatePartition {
                    name: dsu.clone(),
                    size: ImageSize::Unknown,
                },
                Operation::StreamWrite {
                    partition: dsu.clone(),
                    source: PathBuf::from("/sdcard/Download/system.img.xz"),
                    codec: CompressionCodec::Xz,
                },
                Operation::Finalize {
                    partition: dsu,
                    activate: true,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_parameters_never_reach_a_session() {
        let request = InstallationRequest {
            image: PathBuf::from("system.img"),
            image_size: Some(1024),
            partition: "dsu; rm -rf /".to_string(),
            userdata_size_gib: 4,
            codec: None,
        };
        let err = InstallationParameters::try_from(request).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InvalidParameters { ref field, .. } if field == "partition"
        ));
    }

    #[test]
    fn test_concurrent_attempts_admit_exactly_one() {
        let params = InstallationParameters::builder("system.img")
            .partition("dsu")
            .userdata_size_gib(1)
            .build()
            .unwrap();
        let session = Session::new(params, Preferences::new());
        let barrier = Barrier::new(6);

        let outcomes: Vec<bool> = std::thread::scope(|scope| {
            let threads: Vec<_> = (0..6)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        match session.begin_attempt() {
                            Ok(attempt) => {
                                // hold the attempt until every thread has tried
                                barrier.wait();
                                drop(attempt);
                                true
                            }
                            Err(err) => {
                                assert!(matches!(err, PlanError::AttemptInProgress { .. }));
                                barrier.wait();
                                false
                            }
                        }
                    })
                })
                .collect();
            threads.into_iter().map(|t| t.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);
        assert!(!session.is_in_progress());
    }

    #[test]
    fn test_finalize_activate_preference_flows_into_sequence() {
        let params = InstallationParameters::builder("system.img")
            .partition("dsu")
            .userdata_size_gib(1)
            .build()
            .unwrap();
        let prefs = Preferences::new().with(Preferences::FINALIZE_ACTIVATE, "false");
        let sequence = derive_operation_sequence(&params, &prefs);
        assert!(matches!(
            sequence.operations().last(),
            Some(Operation::Finalize {
                activate: false,
                ..
            })
        ));
    }
}
