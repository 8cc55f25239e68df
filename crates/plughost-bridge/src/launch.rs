//! Spawning a plugin and capturing the descriptor it prints.

use crate::descriptor::Descriptor;
use crate::error::BridgeError;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Environment a launched plugin is started with.
pub const PLUGIN_ENV: [(&str, &str); 4] = [
    ("PLUGIN_PROTOCOL_VERSIONS", "4"),
    ("VAULT_BACKEND_PLUGIN", "6669da05-b1c8-4f49-97d9-c8e5bed98e20"),
    ("VAULT_PLUGIN_AUTOMTLS_ENABLED", "true"),
    ("VAULT_VERSION", "1.18.0"),
];

/// Target under which plugin output is logged.
const PLUGIN_TARGET: &str = "plughost::plugin";

/// Where a launch stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Spawned,
    AwaitingDescriptor,
    Ready,
    Failed,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaunchState::Spawned => "spawned",
            LaunchState::AwaitingDescriptor => "awaiting-descriptor",
            LaunchState::Ready => "ready",
            LaunchState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A plugin process that announced its descriptor.
#[derive(Debug)]
pub struct PluginProcess {
    child: Child,
    descriptor: Descriptor,
}

impl PluginProcess {
    /// Spawn `path` and wait for its descriptor line.
    ///
    /// Stdout is scanned line by line until a line carrying `|unix|` or
    /// `|tcp|` appears. End of stream, a malformed descriptor or an expired
    /// `timeout` fails the launch; the child is killed and reaped first.
    pub async fn launch(path: &Path, timeout: Option<Duration>) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(path);
        cmd.envs(PLUGIN_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(BridgeError::Spawn)?;
        let mut state = LaunchState::Spawned;
        debug!(path = %path.display(), pid = child.id(), %state, "plugin launch");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(BufReader::new(stderr).lines(), "stderr"));
        }
        let Some(stdout) = child.stdout.take() else {
            reap(&mut child).await;
            return Err(BridgeError::NoDescriptor);
        };

        state = LaunchState::AwaitingDescriptor;
        debug!(%state, "plugin launch");

        let mut lines = BufReader::new(stdout).lines();
        let scanned = match timeout {
            Some(limit) => match tokio::time::timeout(limit, scan_for_descriptor(&mut lines)).await {
                Ok(found) => found.ok_or(BridgeError::NoDescriptor),
                Err(_) => Err(BridgeError::DescriptorTimeout(limit)),
            },
            None => scan_for_descriptor(&mut lines).await.ok_or(BridgeError::NoDescriptor),
        };

        let parsed = scanned.and_then(|line| {
            info!(descriptor = %line, "captured plugin descriptor");
            Descriptor::parse(&line).map_err(BridgeError::from)
        });

        match parsed {
            Ok(descriptor) => {
                state = LaunchState::Ready;
                debug!(%state, "plugin launch");
                tokio::spawn(forward_lines(lines, "stdout"));
                Ok(Self { child, descriptor })
            }
            Err(e) => {
                state = LaunchState::Failed;
                warn!(%state, error = %e, "plugin launch");
                reap(&mut child).await;
                Err(e)
            }
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process and wait for it so no zombie is left behind.
    pub async fn terminate(mut self) {
        info!(pid = self.child.id(), "killing launched plugin process");
        reap(&mut self.child).await;
    }
}

async fn scan_for_descriptor(lines: &mut Lines<BufReader<ChildStdout>>) -> Option<String> {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: PLUGIN_TARGET, line = %line, "plugin output");
                if Descriptor::looks_like(&line) {
                    return Some(line.trim().to_string());
                }
            }
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "reading plugin stdout failed");
                return None;
            }
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(mut lines: Lines<BufReader<R>>, stream: &'static str) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: PLUGIN_TARGET, stream, "{line}");
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "plugin process already gone");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use plughost_test_utils::temp_script;

    #[tokio::test]
    async fn test_descriptor_captured_after_noise() {
        let (_dir, script) = temp_script(
            "echo 'starting up'\necho '1|4|unix|/tmp/fake-plugin.sock|grpc|'\nsleep 30",
        );
        let process = PluginProcess::launch(&script, None).await.unwrap();
        assert_eq!(process.descriptor().address, "/tmp/fake-plugin.sock");
        assert_eq!(process.descriptor().protocol_version, 4);
        assert!(process.pid().is_some());
        process.terminate().await;
    }

    #[tokio::test]
    async fn test_environment_is_passed() {
        let (_dir, script) = temp_script(
            "echo \"1|$PLUGIN_PROTOCOL_VERSIONS|tcp|127.0.0.1:1|$VAULT_BACKEND_PLUGIN|\"\nsleep 30",
        );
        let process = PluginProcess::launch(&script, None).await.unwrap();
        assert_eq!(process.descriptor().protocol_version, 4);
        // The cookie lands in the wire field, which is not grpc.
        assert_eq!(process.descriptor().wire, crate::WireProtocol::NetRpc);
        process.terminate().await;
    }

    #[tokio::test]
    async fn test_stream_end_without_descriptor() {
        let (_dir, script) = temp_script("echo 'no descriptor here'");
        let err = PluginProcess::launch(&script, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::NoDescriptor));
    }

    #[tokio::test]
    async fn test_malformed_descriptor() {
        let (_dir, script) = temp_script("echo '1|4|unix|'\nsleep 30");
        let err = PluginProcess::launch(&script, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Descriptor(_)));
    }

    #[tokio::test]
    async fn test_descriptor_timeout() {
        let (_dir, script) = temp_script("sleep 30");
        let err = PluginProcess::launch(&script, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DescriptorTimeout(_)));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = PluginProcess::launch(Path::new("/definitely/not/a/plugin"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Spawn(_)));
    }
}
