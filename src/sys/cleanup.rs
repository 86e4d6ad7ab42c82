// src/sys/cleanup.rs

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::sys::credentials::CONFIG_DIR_PREFIX;

/// Removes a materialized config file and then its directory.
///
/// Returns true only if both existed and both were deleted. The directory is
/// still attempted when the file was already gone, but that counts as an
/// incomplete cleanup.
pub async fn remove_materialized(file: &Path, dir: &Path) -> bool {
    let file_removed = match fs::remove_file(file).await {
        Ok(()) => true,
        Err(e) => {
            warn!(path = ?file, error = %e, "failed to remove temporary credentials");
            false
        }
    };

    let dir_removed = match fs::remove_dir(dir).await {
        Ok(()) => true,
        Err(e) => {
            warn!(path = ?dir, error = %e, "failed to remove temporary credential directory");
            false
        }
    };

    file_removed && dir_removed
}

/// Which process a credential directory belongs to, judged by its name.
#[derive(Debug, PartialEq, Eq)]
enum Owner {
    /// The fixed `hyper-commons-plugin` path older plugin builds shared.
    Legacy,
    Agent(i32),
    /// Prefix matches but the rest doesn't parse; left alone.
    Unknown,
}

fn owner_of(name: &str) -> Option<Owner> {
    let rest = name.strip_prefix(CONFIG_DIR_PREFIX)?;
    if rest.is_empty() {
        return Some(Owner::Legacy);
    }
    let tagged = rest.strip_prefix('-')?;
    let owner = tagged
        .split_once('-')
        .and_then(|(pid, _)| pid.parse::<i32>().ok())
        .filter(|pid| *pid > 0)
        .map_or(Owner::Unknown, Owner::Agent);
    Some(owner)
}

/// Signal 0 checks for existence without delivering anything. EPERM still
/// means the process exists, it just belongs to someone else.
fn is_running(pid: i32) -> bool {
    !matches!(signal::kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

/// Deletes credential directories left behind by crashed agents, including the
/// legacy fixed `<tmp_root>/hyper-commons-plugin`.
///
/// Directories tagged with this process or with another agent that is still
/// running are kept, so a second agent sharing `tmp_root` never loses the
/// credentials of a verification it has in flight.
pub async fn prune_stale_configs(tmp_root: &Path) -> Result<usize, AgentError> {
    let mut entries = match fs::read_dir(tmp_root).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            warn!(root = ?tmp_root, error = %e, "failed to scan for stale credentials");
            return Err(AgentError::CleanupIncomplete(tmp_root.to_path_buf()));
        }
    };
    let own_pid = std::process::id() as i32;

    // 1. Collect credential directories whose owner is gone
    let mut stale: Vec<PathBuf> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(owner) = owner_of(&name.to_string_lossy()) else {
            continue;
        };
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        match owner {
            Owner::Legacy => stale.push(entry.path()),
            Owner::Agent(pid) if pid != own_pid && !is_running(pid) => stale.push(entry.path()),
            Owner::Agent(pid) => debug!(path = ?entry.path(), pid, "credential directory owner is alive"),
            Owner::Unknown => debug!(path = ?entry.path(), "skipping unrecognised credential directory"),
        }
    }

    // 2. Remove them; one stubborn directory doesn't stop the rest
    let mut removed = 0;
    for path in &stale {
        if let Err(e) = fs::remove_dir_all(path).await {
            warn!(path = ?path, error = %e, "failed to prune stale credential directory");
        } else {
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, root = ?tmp_root, "pruned stale credential directories");
    }

    Ok(removed)
}
