//! Outcome classification and operator reporting for a depot sync.
//!
//! Failed files are reported individually to the operator channel and the
//! log; they never abort the rest of the depot. Once a depot is done, the
//! post-install hook runs exactly once if anything was installed.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::HookError;
use crate::source::{DepotJob, OperatorNotifier, PostInstallHook};

/// Result of syncing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The installed file already had the manifest digest.
    Unchanged,
    /// New content was verified and installed.
    Installed,
    /// The file could not be fetched, verified or installed.
    Failed {
        reason: String,
        chunks_succeeded: usize,
        chunks_total: usize,
    },
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome of one file, keyed by its manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub outcome: SyncOutcome,
}

impl FileOutcome {
    pub fn new(path: impl Into<String>, outcome: SyncOutcome) -> Self {
        Self {
            path: path.into(),
            outcome,
        }
    }
}

/// Per-file outcomes of one depot sync, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepotSyncReport {
    pub depot_id: u32,
    pub outcomes: Vec<FileOutcome>,
}

impl DepotSyncReport {
    pub fn new(depot_id: u32) -> Self {
        Self {
            depot_id,
            outcomes: Vec::new(),
        }
    }

    pub fn installed(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Installed))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Unchanged))
    }

    pub fn failed(&self) -> usize {
        self.count(SyncOutcome::is_failed)
    }

    /// Whether at least one file was installed.
    pub fn any_files_changed(&self) -> bool {
        self.installed() > 0
    }

    /// Outcome recorded for `path`, if it was processed.
    pub fn outcome_for(&self, path: &str) -> Option<&SyncOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.path == path)
            .map(|o| &o.outcome)
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Reports failures and fires the post-install hook.
#[derive(Clone)]
pub struct SyncReporter {
    notifier: Arc<dyn OperatorNotifier>,
    hook: Arc<dyn PostInstallHook>,
}

impl SyncReporter {
    pub fn new(notifier: Arc<dyn OperatorNotifier>, hook: Arc<dyn PostInstallHook>) -> Self {
        Self { notifier, hook }
    }

    /// Report every failure in `report`, then run the hook if anything was
    /// installed.
    pub fn report(&self, job: &DepotJob, report: &DepotSyncReport) {
        for file in &report.outcomes {
            if let SyncOutcome::Failed {
                reason,
                chunks_succeeded,
                chunks_total,
            } = &file.outcome
            {
                self.notifier.notify(&format!(
                    "[{}] Failed to download {}: Only {} out of {} chunks downloaded ({})",
                    job.display_name(),
                    file.path,
                    chunks_succeeded,
                    chunks_total,
                    reason
                ));
                error!(
                    depot_id = job.depot_id,
                    file = %file.path,
                    server = %job.server,
                    "Failed to download: only {} out of {} chunks downloaded ({})",
                    chunks_succeeded,
                    chunks_total,
                    reason
                );
            }
        }

        if report.any_files_changed() {
            info!(
                depot_id = job.depot_id,
                installed = report.installed(),
                "Depot files updated, running post-install hook"
            );
            if let Err(e) = self.hook.depot_updated(job.depot_id) {
                debug!(depot_id = job.depot_id, error = %e, "Post-install hook failed");
            }
        }
    }
}

/// Operator channel that writes messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl OperatorNotifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "depotsync::operator", "{}", message);
    }
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl PostInstallHook for NoopHook {
    fn depot_updated(&self, _depot_id: u32) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hook that launches a script with the depot id as its only argument.
///
/// The caller does not wait for the script; a background thread reaps it.
/// A missing script is not an error.
#[derive(Debug, Clone)]
pub struct ScriptHook {
    script: PathBuf,
}

impl ScriptHook {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl PostInstallHook for ScriptHook {
    fn depot_updated(&self, depot_id: u32) -> Result<(), HookError> {
        if !self.script.exists() {
            debug!(script = %self.script.display(), "No post-install hook present");
            return Ok(());
        }

        let mut child = Command::new(&self.script)
            .arg(depot_id.to_string())
            .spawn()
            .map_err(|e| HookError {
                path: self.script.clone(),
                source: e,
            })?;

        // Reap the child off the sync path so finished hooks never linger.
        let script = self.script.clone();
        let reaper = std::thread::Builder::new()
            .name("depotsync-hook".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => {
                    debug!(script = %script.display(), %status, "Post-install hook exited")
                }
                Err(e) => {
                    debug!(script = %script.display(), error = %e, "Failed to wait for post-install hook")
                }
            });
        if let Err(e) = reaper {
            debug!(error = %e, "Could not start hook reaper thread");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl OperatorNotifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<u32>>,
        fail: bool,
    }

    impl PostInstallHook for RecordingHook {
        fn depot_updated(&self, depot_id: u32) -> Result<(), HookError> {
            self.calls.lock().push(depot_id);
            if self.fail {
                return Err(HookError {
                    path: PathBuf::from("update.sh"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                });
            }
            Ok(())
        }
    }

    fn job() -> DepotJob {
        DepotJob::new(441, "cdn.test").with_app(440, "Team Fortress 2")
    }

    fn report(outcomes: Vec<(&str, SyncOutcome)>) -> DepotSyncReport {
        DepotSyncReport {
            depot_id: 441,
            outcomes: outcomes
                .into_iter()
                .map(|(p, o)| FileOutcome::new(p, o))
                .collect(),
        }
    }

    fn failed(reason: &str, ok: usize, total: usize) -> SyncOutcome {
        SyncOutcome::Failed {
            reason: reason.to_string(),
            chunks_succeeded: ok,
            chunks_total: total,
        }
    }

    #[test]
    fn test_report_counters() {
        let report = report(vec![
            ("a", SyncOutcome::Installed),
            ("b", SyncOutcome::Unchanged),
            ("c", failed("x", 1, 2)),
            ("d", SyncOutcome::Installed),
        ]);

        assert_eq!(report.installed(), 2);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.any_files_changed());
        assert_eq!(report.outcome_for("b"), Some(&SyncOutcome::Unchanged));
        assert_eq!(report.outcome_for("z"), None);
    }

    #[test]
    fn test_failure_message_format() {
        let notifier = Arc::new(RecordingNotifier::default());
        let hook = Arc::new(RecordingHook::default());
        let reporter = SyncReporter::new(notifier.clone(), hook.clone());

        reporter.report(
            &job(),
            &report(vec![("bin/client.dll", failed("connection reset", 3, 7))]),
        );

        assert_eq!(
            notifier.messages.lock().as_slice(),
            ["[Team Fortress 2] Failed to download bin/client.dll: Only 3 out of 7 chunks downloaded (connection reset)"]
        );
        assert!(hook.calls.lock().is_empty());
    }

    #[test]
    fn test_hook_runs_once_when_files_installed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let hook = Arc::new(RecordingHook::default());
        let reporter = SyncReporter::new(notifier.clone(), hook.clone());

        reporter.report(
            &job(),
            &report(vec![
                ("a", SyncOutcome::Installed),
                ("b", failed("timeout", 0, 1)),
                ("c", SyncOutcome::Installed),
            ]),
        );

        assert_eq!(*hook.calls.lock(), vec![441]);
        assert_eq!(notifier.messages.lock().len(), 1);
    }

    #[test]
    fn test_hook_not_run_when_nothing_changed() {
        let hook = Arc::new(RecordingHook::default());
        let reporter = SyncReporter::new(Arc::new(RecordingNotifier::default()), hook.clone());

        reporter.report(&job(), &report(vec![("a", SyncOutcome::Unchanged)]));

        assert!(hook.calls.lock().is_empty());
    }

    #[test]
    fn test_hook_failure_is_swallowed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let hook = Arc::new(RecordingHook {
            fail: true,
            ..Default::default()
        });
        let reporter = SyncReporter::new(notifier.clone(), hook.clone());

        reporter.report(&job(), &report(vec![("a", SyncOutcome::Installed)]));

        assert_eq!(*hook.calls.lock(), vec![441]);
        assert!(notifier.messages.lock().is_empty());
    }

    #[test]
    fn test_script_hook_missing_script_is_ok() {
        let hook = ScriptHook::new("/nonexistent/update.sh");
        assert!(hook.depot_updated(441).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_script_hook_runs_script_with_depot_id() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("update.sh");
        let out = temp.path().join("out.txt");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$1\" > \"{}\"\n", out.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        ScriptHook::new(&script).depot_updated(441).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Ok(text) = std::fs::read_to_string(&out) {
                if text.trim() == "441" {
                    break;
                }
            }
            assert!(Instant::now() < deadline, "hook script never ran");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
