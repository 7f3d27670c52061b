//! Process spawning and lifecycle management.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::io::{ProcessReader, ProcessWriter, StderrReader};
use crate::config::{BridgeConfig, Model, PermissionMode, SessionId};
use crate::{Error, Result};

/// Per-request settings layered over the [`BridgeConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnOptions {
    /// Resume this session instead of starting a new one.
    pub resume: Option<SessionId>,
    /// Overrides the configured working directory.
    pub working_directory: Option<PathBuf>,
    /// Overrides the configured model.
    pub model: Option<Model>,
}

impl SpawnOptions {
    /// The directory the process runs in, if any.
    pub fn effective_working_directory<'a>(&'a self, config: &'a BridgeConfig) -> Option<&'a Path> {
        self.working_directory
            .as_deref()
            .or_else(|| config.working_directory())
    }
}

/// A running Claude CLI process.
///
/// # Cancellation
///
/// Dropping a `ClaudeProcess` will kill the subprocess if it's still running.
pub struct ClaudeProcess {
    child: Child,
    reader: Option<ProcessReader>,
    writer: Option<ProcessWriter>,
}

impl ClaudeProcess {
    /// Spawn the CLI at `cli` in stream-json mode.
    ///
    /// Nothing is written yet; the caller sends the prompt through the writer.
    pub fn spawn(config: &BridgeConfig, cli: &Path, options: &SpawnOptions) -> Result<Self> {
        let mut cmd = build_command(config, cli, options);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound {
                    searched: cli.display().to_string(),
                }
            } else {
                Error::ProcessSpawn(e)
            }
        })?;

        let pipe_missing = || Error::ProcessSpawn(std::io::Error::other("child pipe missing"));
        let stdin = child.stdin.take().ok_or_else(pipe_missing)?;
        let stdout = child.stdout.take().ok_or_else(pipe_missing)?;
        if let Some(stderr) = child.stderr.take() {
            StderrReader::new(stderr).spawn_logger(child.id());
        }

        tracing::debug!(pid = ?child.id(), cli = %cli.display(), "spawned claude process");

        Ok(Self {
            child,
            reader: Some(ProcessReader::new(stdout)),
            writer: Some(ProcessWriter::new(stdin)),
        })
    }

    /// Take the stdout reader. The reader can only be taken once.
    pub fn take_reader(&mut self) -> Option<ProcessReader> {
        self.reader.take()
    }

    /// Take the stdin writer. The writer can only be taken once.
    pub fn take_writer(&mut self) -> Option<ProcessWriter> {
        self.writer.take()
    }

    /// Get the process ID of the running CLI.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit and return its exit status.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(Error::io)
    }

    /// Try to kill the process without waiting.
    pub fn start_kill(&mut self) -> Result<()> {
        self.child.start_kill().map_err(Error::io)
    }
}

impl Drop for ClaudeProcess {
    fn drop(&mut self) {
        let _ = self.start_kill();
    }
}

fn build_command(config: &BridgeConfig, cli: &Path, options: &SpawnOptions) -> Command {
    let mut cmd = Command::new(cli);

    if let Some(dir) = options.effective_working_directory(config) {
        cmd.current_dir(dir);
    }

    if !config.inherit_env {
        cmd.env_clear();
    }

    for (key, value) in config.build_env() {
        cmd.env(key, value);
    }

    cmd.args(build_args(config, options));
    cmd
}

/// Build CLI arguments for a bidirectional stream-json session.
pub fn build_args(config: &BridgeConfig, options: &SpawnOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--output-format",
        "stream-json",
        "--input-format",
        "stream-json",
        "--verbose",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if config.permission_mode.routes_approvals() {
        args.push("--permission-prompt-tool".to_string());
        args.push("stdio".to_string());
    }

    if let Some(model) = options.model.as_ref().or(config.model.as_ref()) {
        args.push("--model".to_string());
        args.push(model.to_string());
    }

    if config.permission_mode != PermissionMode::Default {
        args.push("--permission-mode".to_string());
        args.push(config.permission_mode.to_string());
    }

    if let Some(ref prompt) = config.system_prompt {
        args.push("--system-prompt".to_string());
        args.push(prompt.clone());
    }

    if let Some(ref prompt) = config.append_system_prompt {
        args.push("--append-system-prompt".to_string());
        args.push(prompt.clone());
    }

    if let Some(ref tools) = config.allowed_tools {
        args.push("--allowedTools".to_string());
        args.push(tools.join(","));
    }

    if let Some(ref tools) = config.disallowed_tools {
        args.push("--disallowedTools".to_string());
        args.push(tools.join(","));
    }

    if let Some(budget) = config.max_budget_usd {
        args.push("--max-budget-usd".to_string());
        args.push(budget.to_string());
    }

    if let Some(ref id) = options.resume {
        args.push("--resume".to_string());
        args.push(id.to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn build_args_stream_json_mode() {
        let config = BridgeConfig::builder().build().unwrap();
        let args = build_args(&config, &SpawnOptions::default());

        assert_eq!(flag_value(&args, "--output-format"), Some("stream-json"));
        assert_eq!(flag_value(&args, "--input-format"), Some("stream-json"));
        assert_eq!(flag_value(&args, "--permission-prompt-tool"), Some("stdio"));
        assert!(args.contains(&"--verbose".to_string()));
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.contains(&"--resume".to_string()));
        assert!(!args.contains(&"--permission-mode".to_string()));
    }

    #[test]
    fn request_model_overrides_config() {
        let config = BridgeConfig::builder().model(Model::Opus).build().unwrap();

        let args = build_args(&config, &SpawnOptions::default());
        assert_eq!(flag_value(&args, "--model"), Some("opus"));

        let options = SpawnOptions {
            model: Some(Model::Haiku),
            ..Default::default()
        };
        let args = build_args(&config, &options);
        assert_eq!(flag_value(&args, "--model"), Some("haiku"));
    }

    #[test]
    fn build_args_with_resume() {
        let config = BridgeConfig::builder().build().unwrap();
        let options = SpawnOptions {
            resume: Some(SessionId::new("test-session")),
            ..Default::default()
        };

        let args = build_args(&config, &options);
        assert_eq!(flag_value(&args, "--resume"), Some("test-session"));
    }

    #[test]
    fn build_args_with_prompts_and_tools() {
        let config = BridgeConfig::builder()
            .system_prompt("You are a helpful assistant")
            .append_system_prompt("Additional context")
            .allowed_tools(["Read", "Glob"])
            .disallowed_tools(["Bash", "Write"])
            .max_budget_usd(5.0)
            .build()
            .unwrap();

        let args = build_args(&config, &SpawnOptions::default());
        assert_eq!(
            flag_value(&args, "--system-prompt"),
            Some("You are a helpful assistant")
        );
        assert_eq!(
            flag_value(&args, "--append-system-prompt"),
            Some("Additional context")
        );
        assert_eq!(flag_value(&args, "--allowedTools"), Some("Read,Glob"));
        assert_eq!(flag_value(&args, "--disallowedTools"), Some("Bash,Write"));
        assert_eq!(flag_value(&args, "--max-budget-usd"), Some("5"));
    }

    #[test]
    fn build_args_with_permission_mode() {
        for (mode, expected) in [
            (PermissionMode::Plan, "plan"),
            (PermissionMode::AcceptEdits, "acceptEdits"),
            (PermissionMode::BypassPermissions, "bypassPermissions"),
        ] {
            let config = BridgeConfig::builder()
                .permission_mode(mode)
                .build()
                .unwrap();
            let args = build_args(&config, &SpawnOptions::default());
            assert_eq!(flag_value(&args, "--permission-mode"), Some(expected));
        }
    }

    #[test]
    fn permission_prompt_only_when_the_mode_asks() {
        let config = BridgeConfig::builder()
            .permission_mode(PermissionMode::AcceptEdits)
            .build()
            .unwrap();
        let args = build_args(&config, &SpawnOptions::default());
        assert_eq!(flag_value(&args, "--permission-prompt-tool"), Some("stdio"));

        for mode in [PermissionMode::Plan, PermissionMode::BypassPermissions] {
            let config = BridgeConfig::builder()
                .permission_mode(mode)
                .build()
                .unwrap();
            let args = build_args(&config, &SpawnOptions::default());
            assert!(!args.contains(&"--permission-prompt-tool".to_string()));
        }
    }

    #[test]
    fn working_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::builder()
            .working_directory(dir.path())
            .build()
            .unwrap();

        let options = SpawnOptions::default();
        assert_eq!(options.effective_working_directory(&config), Some(dir.path()));

        let options = SpawnOptions {
            working_directory: Some(PathBuf::from("/elsewhere")),
            ..Default::default()
        };
        assert_eq!(
            options.effective_working_directory(&config),
            Some(Path::new("/elsewhere"))
        );
    }

    #[tokio::test]
    async fn spawn_missing_cli_is_config_error() {
        let config = BridgeConfig::builder().build().unwrap();
        let result = ClaudeProcess::spawn(
            &config,
            Path::new("/nonexistent/claude-bridge-test/claude"),
            &SpawnOptions::default(),
        );
        let err = result.err().unwrap();
        assert!(matches!(err, Error::CliNotFound { .. }));
    }
}
