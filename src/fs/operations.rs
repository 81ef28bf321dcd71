use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tokio::{fs::File, io::AsyncWriteExt};

/// Replaces the contents of `path` atomically: the new contents are written
/// to a sibling temp file, synced, then renamed over the destination. A crash
/// mid-write leaves either the old file or the new file, never a truncated
/// mix of both.
pub async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = sibling_tmp_path(path);

    let mut tmp = File::create(&tmp_path).await?;
    tmp.write_all(contents).await?;
    tmp.sync_all().await?;
    drop(tmp);

    tokio::fs::rename(&tmp_path, path).await
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
