use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use dsu_errors::PlanError;
use dsu_types::{InstallationParameters, Uuid};

use crate::plan::{derive_operation_sequence, OperationSequence};
use crate::preferences::Preferences;

/// Installation context shared by both execution paths
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    parameters: InstallationParameters,
    preferences: Preferences,
    script_path: OnceLock<PathBuf>,
    in_progress: AtomicBool,
}

impl Session {
    #[must_use]
    pub fn new(parameters: InstallationParameters, preferences: Preferences) -> Self {
        Self {
            id: Uuid::new_v4(),
            parameters,
            preferences,
            script_path: OnceLock::new(),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Correlation id stamped on events of this session
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn parameters(&self) -> &InstallationParameters {
        &self.parameters
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// # Errors
    ///
    /// Returns `PlanError::AttemptInProgress` while an attempt is running.
    pub fn set_parameters(&mut self, parameters: InstallationParameters) -> Result<(), PlanError> {
        self.ensure_idle()?;
        self.parameters = parameters;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `PlanError::AttemptInProgress` while an attempt is running.
    pub fn set_preferences(&mut self, preferences: Preferences) -> Result<(), PlanError> {
        self.ensure_idle()?;
        self.preferences = preferences;
        Ok(())
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Freeze the current parameters and derive the operation sequence
    ///
    /// # Errors
    ///
    /// Returns `PlanError::AttemptInProgress` if another attempt holds the
    /// session.
    pub fn begin_attempt(&self) -> Result<Attempt<'_>, PlanError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| self.attempt_in_progress())?;

        let sequence = derive_operation_sequence(&self.parameters, &self.preferences);
        tracing::debug!(session = %self.id, operations = sequence.len(), "installation attempt started");
        Ok(Attempt {
            session: self,
            sequence,
        })
    }

    #[must_use]
    pub fn installation_script_path(&self) -> Option<&Path> {
        self.script_path.get().map(PathBuf::as_path)
    }

    /// Record where the generated script was written
    ///
    /// # Errors
    ///
    /// Returns `PlanError::ScriptPathAlreadyRecorded` if a path was recorded
    /// since the last [`Self::reset`].
    pub fn record_script_path(&self, path: impl Into<PathBuf>) -> Result<(), PlanError> {
        self.script_path.set(path.into()).map_err(|_| {
            PlanError::ScriptPathAlreadyRecorded {
                path: self
                    .installation_script_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            }
        })
    }

    /// Forget the recorded script so a new one can be generated
    ///
    /// # Errors
    ///
    /// Returns `PlanError::AttemptInProgress` while an attempt is running.
    pub fn reset(&mut self) -> Result<(), PlanError> {
        self.ensure_idle()?;
        self.script_path = OnceLock::new();
        Ok(())
    }

    fn ensure_idle(&mut self) -> Result<(), PlanError> {
        if *self.in_progress.get_mut() {
            return Err(self.attempt_in_progress());
        }
        Ok(())
    }

    fn attempt_in_progress(&self) -> PlanError {
        PlanError::AttemptInProgress {
            session: self.id.to_string(),
        }
    }
}

/// Exclusive installation attempt; dropping it ends the attempt
#[derive(Debug)]
pub struct Attempt<'a> {
    session: &'a Session,
    sequence: OperationSequence,
}

impl Attempt<'_> {
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    #[must_use]
    pub fn parameters(&self) -> &InstallationParameters {
        &self.session.parameters
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.session.preferences
    }

    #[must_use]
    pub fn sequence(&self) -> &OperationSequence {
        &self.sequence
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        self.session.in_progress.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> InstallationParameters {
        InstallationParameters::builder("/sdcard/system.img")
            .partition("dsu")
            .userdata_size_gib(4)
            .build()
            .unwrap()
    }

    #[test]
    fn attempts_are_exclusive() {
        let session = Session::new(params(), Preferences::new());
        let attempt = session.begin_attempt().unwrap();
        assert!(session.is_in_progress());
        assert!(matches!(
            session.begin_attempt(),
            Err(PlanError::AttemptInProgress { .. })
        ));

        drop(attempt);
        assert!(!session.is_in_progress());
        assert!(session.begin_attempt().is_ok());
    }

    #[test]
    fn script_path_recorded_once_until_reset() {
        let mut session = Session::new(params(), Preferences::new());
        session.record_script_path("/tmp/a.sh").unwrap();
        let err = session.record_script_path("/tmp/b.sh").unwrap_err();
        assert_eq!(
            err,
            PlanError::ScriptPathAlreadyRecorded {
                path: "/tmp/a.sh".to_string()
            }
        );
        assert_eq!(
            session.installation_script_path(),
            Some(Path::new("/tmp/a.sh"))
        );

        session.reset().unwrap();
        assert!(session.installation_script_path().is_none());
        session.record_script_path("/tmp/b.sh").unwrap();
    }

    #[test]
    fn parameters_replaced_between_attempts() {
        let mut session = Session::new(params(), Preferences::new());
        let replacement = InstallationParameters::builder("/sdcard/other.img.zst")
            .partition("dsu_b")
            .userdata_size_gib(8)
            .build()
            .unwrap();
        session.set_parameters(replacement).unwrap();

        let attempt = session.begin_attempt().unwrap();
        assert_eq!(attempt.sequence().partition().as_str(), "dsu_b");
        assert_eq!(attempt.parameters().userdata_size_gib(), 8);
    }
}
