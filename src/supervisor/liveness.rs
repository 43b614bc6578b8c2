//! External process-table inspection.
//!
//! Liveness is re-derived from the OS on every poll instead of trusting any
//! persisted state: the probe lists the panes of the managed tmux session,
//! walks their descendant processes, and looks for one whose command line
//! carries the expected executable signature.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// External inspection confirming the supervised process is still alive.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Whether the expected server process currently exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the inspection mechanism itself is unavailable
    /// (tmux or ps failing); the caller decides how to degrade.
    async fn is_alive(&self) -> Result<bool>;
}

/// Probe that inspects the process tree under a tmux session.
#[derive(Debug, Clone)]
pub struct TmuxProcessProbe {
    session: String,
    signature: String,
}

impl TmuxProcessProbe {
    /// Build a probe for `session`, matching `signature` against process
    /// command lines.
    pub fn new(session: String, signature: String) -> Self {
        Self { session, signature }
    }

    /// Root PIDs of every pane in the managed session.
    async fn pane_pids(&self) -> Result<Vec<u32>> {
        let output = Command::new("tmux")
            .args(["list-panes", "-s", "-t", &self.session, "-F", "#{pane_pid}"])
            .output()
            .await
            .context("failed to run tmux list-panes")?;

        if !output.status.success() {
            bail!(
                "tmux list-panes failed for session '{}': {}",
                self.session,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect())
    }
}

#[async_trait]
impl ProcessProbe for TmuxProcessProbe {
    async fn is_alive(&self) -> Result<bool> {
        let roots = self.pane_pids().await?;
        if roots.is_empty() {
            return Ok(false);
        }

        let output = Command::new("ps")
            .args(["-e", "-o", "pid=,ppid=,args="])
            .output()
            .await
            .context("failed to run ps")?;
        if !output.status.success() {
            bail!("ps exited with {}", output.status);
        }

        let table = parse_ps_table(&String::from_utf8_lossy(&output.stdout));
        Ok(signature_in_tree(&table, &roots, &self.signature))
    }
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PsRow {
    pid: u32,
    ppid: u32,
    args: String,
}

/// Parse `ps -e -o pid=,ppid=,args=` output. The numeric columns are
/// right-aligned with arbitrary padding; the command line is kept verbatim.
/// Malformed rows are skipped.
fn parse_ps_table(output: &str) -> Vec<PsRow> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim_start();
            let (pid, rest) = rest.split_once(char::is_whitespace)?;
            let pid = pid.parse().ok()?;
            let rest = rest.trim_start();
            let (ppid, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let ppid = ppid.parse().ok()?;
            Some(PsRow {
                pid,
                ppid,
                args: args.trim_start().to_owned(),
            })
        })
        .collect()
}

/// Whether any process at or below the root PIDs matches the signature.
fn signature_in_tree(table: &[PsRow], roots: &[u32], signature: &str) -> bool {
    let mut members: HashSet<u32> = roots.iter().copied().collect();

    // The table is unordered, so keep sweeping until no new descendants
    // are discovered.
    loop {
        let mut grew = false;
        for row in table {
            if members.contains(&row.ppid) && members.insert(row.pid) {
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    table
        .iter()
        .any(|row| members.contains(&row.pid) && row.args.contains(signature))
}
