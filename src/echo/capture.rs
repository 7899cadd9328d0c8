//! Raw loopback capture through `tcpdump`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

pub struct PacketCapture {
    child: Child,
    file: PathBuf,
}

impl PacketCapture {
    /// Start capturing loopback traffic for the echo server on `port`.
    /// Returns `None` (and logs) when the capture cannot be started.
    pub fn start(dir: &Path, port: u16) -> Option<Self> {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), "cannot create capture directory: {e}");
            return None;
        }

        let file = dir.join(format!("echo_server_{port}.pcap.log"));
        let spawned = Command::new("sudo")
            .args(["tcpdump", "-i", "lo", "-w"])
            .arg(&file)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::info!(file = %file.display(), "running tcpdump");
                Some(Self { child, file })
            }
            Err(e) => {
                tracing::warn!("failed to start tcpdump: {e}");
                None
            }
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Kill the capture process and log whatever it printed.
    pub async fn stop(mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("failed to kill tcpdump: {e}");
        }
        match self.child.wait_with_output().await {
            Ok(output) => tracing::info!(
                stdout = %String::from_utf8_lossy(&output.stdout),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "terminated tcpdump"
            ),
            Err(e) => tracing::warn!("tcpdump did not exit cleanly: {e}"),
        }
    }
}
