//! # Secret collection.
//!
//! Secret processes run to completion before anything else starts. Each one
//! must print a flat JSON object of `string → string` pairs on stdout;
//! those pairs are exported into the supervisor's environment so the second
//! config render can reference them. Any failure aborts startup: a secret
//! the configuration depends on is not something to limp along without.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::SecretSpec;
use crate::error::ProcessError;
use crate::internal::InternalLogger;

/// Runs every non-skipped secret process in order, exporting each one's
/// output before the next starts (later secrets may depend on earlier
/// ones).
pub async fn collect_secrets(
    secrets: &[SecretSpec],
    pmlogger: &InternalLogger,
) -> Result<(), ProcessError> {
    for spec in secrets {
        if spec.skip {
            continue;
        }
        pmlogger.std(format!("collecting secrets from process {}", spec.name));
        let values = run_secret(spec).await?;
        for (key, value) in values {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

/// Runs one secret process under its hard deadline and decodes its stdout.
pub async fn run_secret(spec: &SecretSpec) -> Result<HashMap<String, String>, ProcessError> {
    let secret_err = |reason: String| ProcessError::Secret {
        name: spec.name.clone(),
        reason,
    };

    let mut command = Command::new(&spec.command);
    command
        .args(&spec.arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // The deadline works by dropping the in-flight future; the child
        // must not survive that.
        .kill_on_drop(true);

    let deadline = Duration::from_secs(spec.termination_timeout_seconds.max(1) as u64);
    let output = match tokio::time::timeout(deadline, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(secret_err(format!("failed to run: {e}"))),
        Err(_) => {
            return Err(secret_err(format!(
                "timed out after {} seconds",
                deadline.as_secs()
            )))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(secret_err(format!(
            "exited with {}. stderr: {}",
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr.trim()
        )));
    }

    decode_secret_output(&output.stdout)
        .map_err(|e| secret_err(format!("failed to decode the secrets: {e}")))
}

/// The whole stdout must be one flat JSON object of strings.
fn decode_secret_output(stdout: &[u8]) -> Result<HashMap<String, String>, serde_json::Error> {
    serde_json::from_slice(stdout)
}
