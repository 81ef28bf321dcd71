use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

/// Directory holding the log files and rotated tracing output. On Linux this
/// follows the XDG state convention, on macOS the Application Support
/// directory.
pub fn default_state_dir() -> Result<PathBuf> {
    let path = {
        #[cfg(target_os = "macos")]
        {
            let mut path = env::var("HOME")
                .map(PathBuf::from)
                .context("Couldn't find HOME")?;
            path.push("Library/Application Support");
            path.push("daylog");
            path
        }
        #[cfg(not(target_os = "macos"))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push("daylog");
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}
