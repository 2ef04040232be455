//! Mountpoint preparation and unmount helpers.
//!
//! A previous process may have died and left a stale FUSE mount behind;
//! touching such a mountpoint yields "Transport endpoint is not connected".
//! Preparation therefore unmounts anything already mounted there before the
//! directory is (re)created.

use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Run a command, swallowing a missing binary. Returns true when the command
/// ran and exited successfully.
fn run_quiet(program: &str, args: &[&str]) -> bool {
    match Command::new(program).args(args).output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            debug!(program = program, error = %e, "Command unavailable");
            false
        }
    }
}

/// Check `/proc/mounts` for an active mount at `path`. When the table cannot
/// be read the answer is assumed true so preparation still attempts the
/// unmount chain.
pub fn is_mounted(path: &Path) -> bool {
    let needle = format!(" {} ", path.display());
    match std::fs::read_to_string("/proc/mounts") {
        Ok(mounts) => mounts.lines().any(|line| line.contains(&needle)),
        Err(_) => true,
    }
}

/// Try the unmount strategies in order, from graceful to lazy. Missing
/// binaries are skipped.
pub fn unmount_stale(path: &Path) {
    let target = path.to_string_lossy();
    for (program, args) in [
        ("fusermount3", vec!["-u", "-z", target.as_ref()]),
        ("fusermount", vec!["-u", "-z", target.as_ref()]),
        ("umount", vec!["-l", target.as_ref()]),
    ] {
        if run_quiet(program, &args) {
            info!(mountpoint = %target, program = program, "Unmounted stale mount");
            return;
        }
    }
}

/// Prepare a mountpoint: unmount anything stale, then ensure the directory
/// exists (recreating it when the existing one is unusable).
pub fn prepare_mountpoint(path: &Path) -> std::io::Result<()> {
    if is_mounted(path) {
        unmount_stale(path);
    }

    if let Err(e) = std::fs::create_dir_all(path) {
        warn!(mountpoint = %path.display(), error = %e, "Recreating mountpoint directory");
        let _ = std::fs::remove_dir(path);
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Final safety-net unmount used during shutdown.
pub fn final_unmount(path: &Path) {
    let target = path.to_string_lossy();
    run_quiet("fusermount", &["-u", target.as_ref()]);
}

/// Remove the mountpoint directory if it is empty. Errors are ignored.
pub fn remove_mountpoint_if_empty(path: &Path) {
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                let _ = std::fs::remove_dir(path);
            }
        }
        Err(_) => {}
    }
}
