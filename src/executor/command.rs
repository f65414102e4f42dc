// ABOUTME: Shell command construction for remote execution.
// ABOUTME: Quotes every interpolated argument and base64-encodes generated file content.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Where a command group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Inside the per-run helper container.
    Helper,
    /// Directly in the host shell.
    Host,
}

/// One shell command plus how its outcome is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    pub(crate) command: String,
    pub(crate) target: Target,
    pub(crate) hidden: bool,
    pub(crate) ignore_errors: bool,
    pub(crate) save: Option<String>,
}

impl CommandGroup {
    pub fn in_helper(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: Target::Helper,
            hidden: false,
            ignore_errors: false,
            save: None,
        }
    }

    pub fn on_host(command: impl Into<String>) -> Self {
        Self {
            target: Target::Host,
            ..Self::in_helper(command)
        }
    }

    /// Keep the command and its output out of the user-visible log.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// A non-zero exit does not fail the phase.
    pub fn ignore_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    /// Capture trimmed stdout into the named slot.
    pub fn save(mut self, slot: impl Into<String>) -> Self {
        self.save = Some(slot.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// The command line actually sent to the host.
    pub fn render(&self, helper: &str) -> String {
        match self.target {
            Target::Host => self.command.clone(),
            Target::Helper => docker_exec(helper, &self.command),
        }
    }
}

/// POSIX single-quote escaping.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Run `command` with bash inside `container`.
pub fn docker_exec(container: &str, command: &str) -> String {
    format!("docker exec {} bash -c {}", container, shell_quote(command))
}

/// Write `contents` to `path` without ever placing raw content on the command line.
pub fn write_file(path: &str, contents: &str) -> String {
    format!(
        "echo '{}' | base64 -d | tee {} > /dev/null",
        BASE64.encode(contents.as_bytes()),
        shell_quote(path)
    )
}

/// Inverse of the encoding used by [`write_file`].
pub fn decode_payload(encoded: &str) -> Option<String> {
    BASE64
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}
