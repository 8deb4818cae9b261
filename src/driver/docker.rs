//! Docker command execution

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, trace};

use super::Driver;
use crate::error::{PushError, Result};

/// Go template that selects the first repository digest of an image
pub const DIGEST_FORMAT: &str = "{{(index .RepoDigests 0)}}";

/// Output from a docker command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (0 = success)
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A docker invocation: arguments after the global options, plus optional stdin
#[derive(Clone, Default, PartialEq)]
pub struct DockerCommand {
    pub args: Vec<String>,
    stdin: Option<String>,
}

impl DockerCommand {
    pub fn new(subcommand: &str) -> Self {
        Self {
            args: vec![subcommand.to_string()],
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_if(self, condition: bool, arg: impl Into<String>) -> Self {
        if condition { self.arg(arg) } else { self }
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Printable form of the invocation. Stdin is never included.
    pub fn to_command_string(&self) -> String {
        self.args.join(" ")
    }

    pub fn login(server: &str, username: &str, password: &str) -> Self {
        let mut cmd = Self::new("login");
        if !username.is_empty() {
            cmd = cmd.arg("-u").arg(username);
        }
        if !password.is_empty() {
            cmd = cmd.arg("--password-stdin").stdin(password);
        }
        cmd.arg_if(!server.is_empty(), server)
    }

    pub fn logout(server: &str) -> Self {
        Self::new("logout").arg_if(!server.is_empty(), server)
    }

    pub fn push(name: &str, platform: &str) -> Self {
        let mut cmd = Self::new("push");
        if !platform.is_empty() {
            cmd = cmd.arg("--platform").arg(platform);
        }
        cmd.arg(name)
    }

    pub fn digest(id: &str) -> Self {
        Self::new("inspect").arg("--format").arg(DIGEST_FORMAT).arg(id)
    }

    pub fn remove_image(id: &str) -> Self {
        Self::new("rmi").arg(id)
    }
}

impl std::fmt::Debug for DockerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCommand")
            .field("args", &self.args)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Driver that runs the docker executable
#[derive(Debug, Clone)]
pub struct DockerDriver {
    executable: PathBuf,
    /// Passed as `--config`; the engine's default config directory is used when unset
    config_dir: Option<PathBuf>,
}

impl DockerDriver {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config_dir: None,
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Full argument list including global options
    pub fn command_args(&self, cmd: &DockerCommand) -> Vec<String> {
        let mut args = Vec::with_capacity(cmd.args.len() + 2);
        if let Some(ref dir) = self.config_dir {
            args.push("--config".to_string());
            args.push(dir.display().to_string());
        }
        args.extend(cmd.args.iter().cloned());
        args
    }

    fn describe(&self, cmd: &DockerCommand) -> String {
        format!("{} {}", self.executable.display(), self.command_args(cmd).join(" "))
    }

    fn build_command(&self, cmd: &DockerCommand) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(self.command_args(cmd))
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Execute a docker command and wait for completion
    #[instrument(skip(self), fields(command = %cmd.to_command_string()))]
    pub async fn execute(&self, cmd: &DockerCommand) -> Result<CommandOutput> {
        debug!("Executing docker command");
        trace!("Full command: {:?}", cmd);

        let mut child = self.build_command(cmd).spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", self.executable.display(), e);
            PushError::Io(e)
        })?;

        if let Some(ref input) = cmd.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // Closing stdin lets `--password-stdin` finish reading
                drop(stdin);
            }
        }

        let output = child.wait_with_output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            debug!(
                "Docker command failed with exit code {}: {}",
                exit_code,
                stderr.trim()
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Execute a docker command and return an error if it fails
    pub async fn execute_checked(&self, cmd: &DockerCommand) -> Result<CommandOutput> {
        let output = self.execute(cmd).await?;

        if !output.success() {
            return Err(PushError::Command {
                command: self.describe(cmd),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    /// Execute a docker command, forwarding each stdout line to tracing as it arrives
    #[instrument(skip(self), fields(command = %cmd.to_command_string()))]
    pub async fn execute_streaming(&self, cmd: &DockerCommand) -> Result<CommandOutput> {
        let mut child = self.build_command(cmd).spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", self.executable.display(), e);
            PushError::Io(e)
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes concurrently
        let read_stdout = async {
            let mut collected = String::new();
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    info!("{}", line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
            Ok::<_, std::io::Error>(collected)
        };
        let read_stderr = async {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Some(line) = lines.next_line().await? {
                    debug!("{}", line);
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
            Ok::<_, std::io::Error>(collected)
        };

        let (stdout_output, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 {
            return Err(PushError::Command {
                command: self.describe(cmd),
                exit_code,
                stderr,
            });
        }

        Ok(CommandOutput {
            stdout: stdout_output,
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl Driver for DockerDriver {
    async fn login(&self, server: &str, username: &str, password: &str) -> Result<()> {
        self.execute_checked(&DockerCommand::login(server, username, password))
            .await
            .map(|_| ())
    }

    async fn logout(&self, server: &str) -> Result<()> {
        self.execute_checked(&DockerCommand::logout(server))
            .await
            .map(|_| ())
    }

    async fn push(&self, name: &str, platform: &str) -> Result<()> {
        self.execute_streaming(&DockerCommand::push(name, platform))
            .await
            .map(|_| ())
    }

    async fn digest(&self, id: &str) -> Result<String> {
        let output = self.execute_checked(&DockerCommand::digest(id)).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn delete_image(&self, id: &str) -> Result<()> {
        self.execute_checked(&DockerCommand::remove_image(id))
            .await
            .map(|_| ())
    }
}
