use std::process::{Output, Stdio};

use tokio::process::Command;

use crate::error::ExecError;

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

/// Run to completion with piped stdout/stderr; a non-zero exit becomes an error.
pub async fn run_captured(mut cmd: Command) -> Result<Output, ExecError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| ExecError::Spawn(e.to_string()))?;

    if output.status.success() {
        return Ok(output);
    }
    match output.status.code() {
        Some(code) => Err(ExecError::NonZeroExit {
            code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        None => Err(ExecError::KilledBySignal),
    }
}
