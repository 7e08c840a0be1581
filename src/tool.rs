//! External tool invocation and discovery.
//!
//! [`ToolCommand`] runs a child process from an explicit argument vector
//! (no shell), captures stderr, and races completion against a hard timeout
//! and the request's cancellation token. Losing either race kills the child.
//! The child is also spawned with `kill_on_drop`, so dropping the request
//! future never leaves a process behind.

use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, ToolSpec};
use crate::error::ConvertError;

/// The external programs the registry can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    ImageMagick,
    Ffmpeg,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::ImageMagick => "imagemagick",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    fn install_hint(self) -> &'static str {
        match self {
            Tool::ImageMagick => "install ImageMagick (magick or convert) or set MEDIACONV_IMAGEMAGICK",
            Tool::Ffmpeg => "install ffmpeg or set MEDIACONV_FFMPEG",
        }
    }

    /// Locate the tool: explicit config first, then `PATH`.
    pub fn resolve(self, config: &PipelineConfig) -> Result<ToolSpec, ConvertError> {
        let configured = match self {
            Tool::ImageMagick => config.imagemagick.as_ref(),
            Tool::Ffmpeg => config.ffmpeg.as_ref(),
        };
        if let Some(spec) = configured {
            return Ok(spec.clone());
        }
        let candidates: &[&str] = match self {
            Tool::ImageMagick => &["magick", "convert"],
            Tool::Ffmpeg => &["ffmpeg"],
        };
        candidates
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(ToolSpec::new)
            .ok_or_else(|| ConvertError::MissingDependency {
                name: self.name().to_string(),
                hint: self.install_hint().to_string(),
            })
    }

    /// Build the conversion command `in → out` for this tool.
    pub fn conversion(self, spec: &ToolSpec, input: &Path, output: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.name(), &spec.program);
        cmd.args(spec.leading_args.iter().cloned());
        match self {
            Tool::ImageMagick => {
                cmd.arg(input).arg(output);
            }
            Tool::Ffmpeg => {
                cmd.args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"])
                    .arg(input)
                    .arg(output);
            }
        }
        cmd
    }
}

/// A single external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    label: String,
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

/// What a successful run left behind.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolCommand {
    /// `label` names the tool in errors and logs; `program` is what is executed.
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn arg(&mut self, a: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(a.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(iter.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run to completion, timeout, or cancellation.
    ///
    /// # Errors
    /// - [`ConvertError::MissingDependency`] if the program cannot be spawned
    ///   because it does not exist.
    /// - [`ConvertError::ExternalToolFailure`] on a non-zero exit, with stderr.
    /// - [`ConvertError::Timeout`] when the deadline passes; the child is killed.
    /// - [`ConvertError::Cancelled`] when `cancel` fires; the child is killed.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ToolOutput, ConvertError> {
        info!(
            tool = %self.label,
            program = %self.program.display(),
            args = self.args.len(),
            "spawning external tool"
        );
        let started = std::time::Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ConvertError::MissingDependency {
                    name: self.label.clone(),
                    hint: format!("'{}' not found", self.program.display()),
                },
                _ => ConvertError::io(format!("spawning {}", self.label), e),
            })?;

        // Waiting includes draining stderr: a grandchild that inherited the
        // pipe can hold it open after the tool itself has exited.
        let (status, stderr) = tokio::select! {
            (status, stderr) = wait_with_stderr(&mut child) => {
                let status = status
                    .map_err(|e| ConvertError::io(format!("waiting for {}", self.label), e))?;
                (status, stderr)
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(tool = %self.label, timeout_s = self.timeout.as_secs_f32(), "tool timed out, killing");
                let _ = child.kill().await;
                return Err(ConvertError::Timeout {
                    tool: self.label.clone(),
                    after: self.timeout,
                });
            }
            _ = cancel.cancelled() => {
                debug!(tool = %self.label, "cancelled, killing tool");
                let _ = child.kill().await;
                return Err(ConvertError::Cancelled);
            }
        };
        let elapsed = started.elapsed();

        if !status.success() {
            debug!(tool = %self.label, %status, stderr = %stderr.trim(), "tool failed");
            return Err(ConvertError::tool_failure(&self.label, status, &stderr));
        }
        debug!(tool = %self.label, elapsed_ms = elapsed.as_millis() as u64, "tool finished");
        Ok(ToolOutput { stderr, elapsed })
    }
}

/// Read stderr to EOF, then reap the child.
async fn wait_with_stderr(child: &mut Child) -> (std::io::Result<ExitStatus>, String) {
    let mut buf = Vec::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    let status = child.wait().await;
    (status, String::from_utf8_lossy(&buf).into_owned())
}

/// Availability of one dependency, as reported by [`tool_report`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

/// Probe every external dependency the registry can call on.
///
/// Runs each tool's version flag synchronously; call from a blocking context
/// or a CLI, not from a hot request path.
pub fn tool_report(config: &PipelineConfig) -> Vec<ToolInfo> {
    let mut report: Vec<ToolInfo> = [Tool::ImageMagick, Tool::Ffmpeg]
        .into_iter()
        .map(|tool| match tool.resolve(config) {
            Ok(spec) => ToolInfo {
                name: tool.name().to_string(),
                available: true,
                version: detect_version(tool, &spec),
                path: Some(spec.program),
            },
            Err(_) => ToolInfo {
                name: tool.name().to_string(),
                available: false,
                path: None,
                version: None,
            },
        })
        .collect();
    report.push(crate::pipeline::pdfium::probe(config));
    report
}

/// First line of `<tool> -version` / `--version`.
fn detect_version(tool: Tool, spec: &ToolSpec) -> Option<String> {
    let flag = match tool {
        Tool::Ffmpeg => "-version",
        Tool::ImageMagick => "--version",
    };
    let output = std::process::Command::new(&spec.program)
        .args(&spec.leading_args)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}
