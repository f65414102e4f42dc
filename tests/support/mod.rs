// ABOUTME: Test support utilities.
// ABOUTME: Scripted hosts standing in for SSH transports, plus manifest and tracing helpers.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use skiff::config::{Manifest, ServerConfig};
use skiff::transport::{CommandOutput, Connector, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Commit every scripted `git ls-remote` resolves `main` to.
#[allow(dead_code)]
pub const SHA: &str = "4f2c9d1e8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d";

/// Dockerfile nixpacks "generates" on scripted hosts.
#[allow(dead_code)]
pub const NIXPACKS_DOCKERFILE: &str = "FROM node:20\nWORKDIR /app\nCOPY . .\nRUN npm ci\nCMD [\"npm\", \"start\"]\n";

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("skiff=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

type Hook = Arc<dyn Fn() + Send + Sync>;

struct Rule {
    needle: String,
    responses: Vec<CommandOutput>,
    served: usize,
}

/// A host that answers commands from a script and records everything it ran.
///
/// Rules match by substring; the most recently added matching rule answers.
/// A rule with several responses serves them in order and then repeats the
/// last one. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedHost {
    rules: Mutex<Vec<Rule>>,
    hooks: Mutex<Vec<(String, Hook)>>,
    commands: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, needle: &str, output: CommandOutput) {
        self.respond_seq(needle, vec![output]);
    }

    pub fn respond_seq(&self, needle: &str, responses: Vec<CommandOutput>) {
        assert!(!responses.is_empty(), "a rule needs at least one response");
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            responses,
            served: 0,
        });
    }

    pub fn fail(&self, needle: &str, stderr: &str) {
        self.respond(needle, CommandOutput::failed(1, stderr));
    }

    /// Run `hook` every time a command containing `needle` executes.
    pub fn on_command(&self, needle: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().push((needle.to_string(), Arc::new(hook)));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.count(needle) > 0
    }

    /// Index of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands.lock().iter().position(|c| c.contains(needle))
    }

    /// First command containing `needle`.
    pub fn find(&self, needle: &str) -> Option<String> {
        self.commands
            .lock()
            .iter()
            .find(|c| c.contains(needle))
            .cloned()
    }

    /// Contents of the last base64 write to `path`.
    pub fn written(&self, path: &str) -> Option<String> {
        let commands = self.commands.lock();
        let command = commands
            .iter()
            .rev()
            .find(|c| c.contains("| base64 -d | tee") && c.contains(path))?;
        let encoded: String = command
            .split_once("echo ")?
            .1
            .trim_start_matches(['\'', '\\'])
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
            .collect();
        skiff::executor::decode_payload(&encoded)
    }

    fn answer(&self, command: &str) -> CommandOutput {
        let mut rules = self.rules.lock();
        match rules.iter_mut().rev().find(|r| command.contains(&r.needle)) {
            Some(rule) => {
                let index = rule.served.min(rule.responses.len() - 1);
                rule.served += 1;
                rule.responses[index].clone()
            }
            None => CommandOutput::ok(""),
        }
    }
}

#[async_trait]
impl Transport for ScriptedHost {
    async fn exec(&self, command: &str) -> skiff::ssh::Result<CommandOutput> {
        self.commands.lock().push(command.to_string());
        let hooks: Vec<Hook> = self
            .hooks
            .lock()
            .iter()
            .filter(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, hook)| hook.clone())
            .collect();
        for hook in hooks {
            hook();
        }
        Ok(self.answer(command))
    }
}

/// Hands out scripted hosts by server host name.
#[derive(Default)]
pub struct ScriptedConnector {
    hosts: HashMap<String, Arc<ScriptedHost>>,
}

#[allow(dead_code)]
impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, scripted: Arc<ScriptedHost>) -> Self {
        self.hosts.insert(host.to_string(), scripted);
        self
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, server: &ServerConfig) -> skiff::ssh::Result<Arc<dyn Transport>> {
        match self.hosts.get(&server.host) {
            Some(host) => Ok(host.clone() as Arc<dyn Transport>),
            None => Err(skiff::ssh::Error::Connection {
                host: server.host.clone(),
                reason: "no scripted host".to_string(),
            }),
        }
    }
}

/// Template manifest deploying to `10.0.0.5` with a fixed secrets key.
#[allow(dead_code)]
pub fn manifest() -> Manifest {
    let mut manifest = Manifest::template();
    manifest.servers = nonempty::NonEmpty::new(ServerConfig::new("10.0.0.5"));
    manifest.settings = manifest.settings.with_secrets_key("test-secrets-key");
    manifest
}

/// Output of `base64 -w0` reading a file with `contents`.
#[allow(dead_code)]
pub fn file_output(contents: &str) -> CommandOutput {
    CommandOutput::ok(STANDARD.encode(contents))
}

/// A host where `main` resolves to [`SHA`].
#[allow(dead_code)]
pub fn source_host() -> Arc<ScriptedHost> {
    let host = ScriptedHost::new();
    host.respond(
        "git ls-remote",
        CommandOutput::ok(format!("{SHA}\trefs/heads/main\n")),
    );
    host
}

/// A host where `main` resolves to [`SHA`] and nixpacks produces a plan and Dockerfile.
#[allow(dead_code)]
pub fn nixpacks_host() -> Arc<ScriptedHost> {
    let host = source_host();
    host.respond(
        "nixpacks plan",
        CommandOutput::ok(r#"{"variables":{"NIXPACKS_NODE_VERSION":"20"}}"#),
    );
    host.respond("base64 -w0", file_output(NIXPACKS_DOCKERFILE));
    host
}
