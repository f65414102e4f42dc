// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment run.
// ABOUTME: Cleanup-category failures land here instead of changing the run's outcome.

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn helper_teardown(message: impl Into<String>) -> Self {
        Self::new(WarningKind::HelperTeardown, message)
    }

    pub fn config_write(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ConfigWrite, message)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Notification, message)
    }
}

/// Categories of cleanup warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Helper container could not be removed.
    HelperTeardown,
    /// Compose or env file not persisted to the configuration directory.
    ConfigWrite,
    Notification,
    /// Image of a failed build could not be removed.
    ImageCleanup,
    PostDeploymentCommand,
    /// Follow-up deployment for an additional server could not be queued.
    FanOut,
    /// Store bookkeeping after the terminal transition.
    Bookkeeping,
}
