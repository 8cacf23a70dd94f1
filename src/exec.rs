//! Execution sink for command and metric probes.
//!
//! Commands run through `/bin/sh -c`, either on the local host or inside a
//! target pod via `kubectl exec`.

use crate::error::{FaultlineError, Result};
use serde::{Deserialize, Serialize};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Where a command is executed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecTarget {
    #[default]
    Local,
    Pod {
        namespace: String,
        pod: String,
        #[serde(default)]
        container: Option<String>,
    },
}

/// Runs a command and returns its stdout.
#[async_trait::async_trait]
pub trait CommandSink: Send + Sync {
    async fn execute(&self, command: &str, target: &ExecTarget) -> Result<String>;
}

/// Shell-backed sink.
#[derive(Debug, Clone)]
pub struct ShellSink {
    shell: String,
    kubectl: String,
}

impl Default for ShellSink {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

impl ShellSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the kubectl binary used for pod targets.
    pub fn with_kubectl(mut self, kubectl: impl Into<String>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    fn build(&self, command: &str, target: &ExecTarget) -> Command {
        match target {
            ExecTarget::Local => {
                let mut cmd = Command::new(&self.shell);
                cmd.arg("-c").arg(command);
                cmd
            }
            ExecTarget::Pod {
                namespace,
                pod,
                container,
            } => {
                let mut cmd = Command::new(&self.kubectl);
                cmd.arg("exec").arg("-n").arg(namespace).arg(pod);
                if let Some(container) = container {
                    cmd.arg("-c").arg(container);
                }
                cmd.arg("--").arg(&self.shell).arg("-c").arg(command);
                cmd
            }
        }
    }
}

fn classify_failure(output: &Output) -> FaultlineError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("container is in terminated state")
        || stderr.contains("cannot exec into a container in a completed pod")
    {
        return FaultlineError::ContainerTerminated;
    }
    FaultlineError::Execution(format!(
        "unable to run command ({}): {}",
        output.status, stderr
    ))
}

#[async_trait::async_trait]
impl CommandSink for ShellSink {
    async fn execute(&self, command: &str, target: &ExecTarget) -> Result<String> {
        debug!(command = %command, target = ?target, "Executing command");

        let output = self
            .build(command, target)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(classify_failure(&output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_command_output() {
        let sink = ShellSink::new();
        let out = sink.execute("echo hello", &ExecTarget::Local).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_execution_error() {
        let sink = ShellSink::new();
        let err = sink
            .execute("echo broken >&2; exit 3", &ExecTarget::Local)
            .await
            .unwrap_err();
        match err {
            FaultlineError::Execution(reason) => assert!(reason.contains("broken")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminated_container_sentinel() {
        let sink = ShellSink::new();
        let err = sink
            .execute(
                "echo 'error: container is in terminated state' >&2; exit 1",
                &ExecTarget::Local,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FaultlineError::ContainerTerminated));
    }

    #[test]
    fn test_pod_target_uses_kubectl() {
        let sink = ShellSink::new().with_kubectl("/usr/local/bin/kubectl");
        let target = ExecTarget::Pod {
            namespace: "shop".into(),
            pod: "cart-0".into(),
            container: Some("app".into()),
        };
        let cmd = sink.build("date", &target);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/usr/local/bin/kubectl");
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["exec", "-n", "shop", "cart-0", "-c", "app", "--", "/bin/sh", "-c", "date"]
        );
    }
}
