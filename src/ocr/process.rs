//! Bounded subprocess invocation for command-line OCR and rasterization tools.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found on PATH")]
    NotFound { tool: String },

    #[error("{tool} timed out after {}s", timeout.as_secs())]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Create a scratch directory, under `root` when one is configured.
///
/// The directory and everything in it is removed when the guard drops.
pub fn scratch_dir(root: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("studybuddy-");
    match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

/// Build a command for `program` with stdio captured and the child killed on drop.
pub fn tool_command<S: AsRef<OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Run a prepared command to completion, bounded by `timeout`.
///
/// A non-zero exit status is an error. When the timeout elapses the output
/// future is dropped, which kills the child.
pub async fn run_tool(
    cmd: &mut Command,
    tool: &str,
    timeout: Duration,
) -> Result<Output, ToolError> {
    debug!("running {} (timeout {:?})", tool, timeout);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::NotFound {
                tool: tool.to_string(),
            })
        }
        Ok(Err(e)) => {
            return Err(ToolError::Io {
                tool: tool.to_string(),
                source: e,
            })
        }
        Err(_) => {
            return Err(ToolError::TimedOut {
                tool: tool.to_string(),
                timeout,
            })
        }
    };

    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run `<program> <version_arg>` and return the first non-empty line it prints.
///
/// Some tools (pdftoppm) print their version to stderr, so both streams are checked.
pub async fn probe_version(
    program: &str,
    version_arg: &str,
    timeout: Duration,
) -> Result<String, ToolError> {
    let mut cmd = tool_command(program);
    cmd.arg(version_arg);
    let output = run_tool(&mut cmd, program, timeout).await?;

    let first_line = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    };

    Ok(first_line(&output.stdout)
        .or_else(|| first_line(&output.stderr))
        .unwrap_or_else(|| program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let path = {
            let scratch = scratch_dir(Some(root.path())).unwrap();
            std::fs::write(scratch.path().join("page.png"), b"x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_not_found() {
        let mut cmd = tool_command("studybuddy-definitely-not-a-real-tool");
        let err = run_tool(&mut cmd, "missing", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { ref tool } if tool == "missing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_slow_tool() {
        let mut cmd = tool_command("sleep");
        cmd.arg("5");
        let err = run_tool(&mut cmd, "sleep", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let mut cmd = tool_command("false");
        let err = run_tool(&mut cmd, "false", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_version_reads_first_line() {
        let version = probe_version("echo", "v1.2.3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(version, "v1.2.3");
    }
}
