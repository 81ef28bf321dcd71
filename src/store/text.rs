use std::path::{Path, PathBuf};

use fs4::tokio::AsyncFileExt;
use tokio::fs::File;
use tracing::{debug, warn};

use crate::fs::operations::replace_file;

use super::StoreError;

/// The main log-store realization: header + record lines, last line mutable.
///
/// A sidecar `<path>.lock` file is held under an exclusive advisory lock for
/// the lifetime of the store. The data file itself is replaced wholesale on
/// commit, so locking the data file would guard the wrong inode.
pub struct TextLogStore {
    path: PathBuf,
    header: String,
    records: Vec<String>,
    _lock: File,
}

impl TextLogStore {
    /// Opens or creates the store at `path`. A missing, short, or
    /// wrong-header file is treated as empty history; nothing is written
    /// until the first [TextLogStore::commit].
    pub async fn open(path: &Path, header: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let lock = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path(path))
            .await?;
        lock.try_lock_exclusive().map_err(|_| StoreError::Locked {
            path: path.to_owned(),
        })?;

        let records = match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let mut lines = contents.lines();
                match lines.next() {
                    Some(first) if first == header => {
                        lines.map(str::to_owned).collect::<Vec<_>>()
                    }
                    Some(_) => {
                        warn!("Header of {path:?} does not match, starting fresh history");
                        vec![]
                    }
                    None => vec![],
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => return Err(e.into()),
        };

        debug!("Opened log store {path:?} with {} records", records.len());

        Ok(Self {
            path: path.to_owned(),
            header: header.to_owned(),
            records,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Last `n` record lines, fewer if the store is shorter.
    pub fn tail(&self, n: usize) -> &[String] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn push(&mut self, line: String) {
        self.records.push(line);
    }

    /// Replaces the last `n` record lines with `lines`. `n` is capped at the
    /// current record count.
    pub fn set_tail(&mut self, n: usize, lines: Vec<String>) {
        let start = self.records.len().saturating_sub(n);
        self.records.truncate(start);
        self.records.extend(lines);
    }

    /// Discards all records, leaving fresh history with only the header.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Atomically persists header + records.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let mut contents = String::with_capacity(
            self.header.len() + self.records.iter().map(|v| v.len() + 1).sum::<usize>() + 1,
        );
        contents.push_str(&self.header);
        contents.push('\n');
        for record in &self.records {
            contents.push_str(record);
            contents.push('\n');
        }

        replace_file(&self.path, contents.as_bytes()).await?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::store::StoreError;

    use super::TextLogStore;

    const HEADER: &str = "Date\tValue";

    #[tokio::test]
    async fn test_open_missing_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = TextLogStore::open(&dir.path().join("data.log"), HEADER).await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_and_reload() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.log");

        let mut store = TextLogStore::open(&path, HEADER).await?;
        store.push("2024-03-01 10:00:00\t1".into());
        store.push("2024-03-02 10:00:00\t2".into());
        store.commit().await?;
        drop(store);

        let reloaded = TextLogStore::open(&path, HEADER).await?;
        assert_eq!(
            reloaded.records(),
            ["2024-03-01 10:00:00\t1", "2024-03-02 10:00:00\t2"]
        );
        assert_eq!(reloaded.tail(1), ["2024-03-02 10:00:00\t2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_tail_replaces_lines() -> Result<()> {
        let dir = tempdir()?;
        let mut store = TextLogStore::open(&dir.path().join("data.log"), HEADER).await?;
        store.push("a".into());
        store.push("b".into());
        store.push("c".into());

        store.set_tail(2, vec!["b2".into(), "c2".into(), "d".into()]);

        assert_eq!(store.records(), ["a", "b2", "c2", "d"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_header_starts_fresh() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.log");
        tokio::fs::write(&path, "Some other header\nline\n").await?;

        let store = TextLogStore::open(&path, HEADER).await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_open_is_locked() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.log");

        let _store = TextLogStore::open(&path, HEADER).await?;
        let err = TextLogStore::open(&path, HEADER)
            .await
            .err()
            .expect("second open should fail");
        assert!(matches!(err, StoreError::Locked { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_overwrites_previous_contents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data.log");

        let mut store = TextLogStore::open(&path, HEADER).await?;
        store.push("old line that is much longer than its replacement".into());
        store.commit().await?;

        store.set_tail(1, vec!["new".into()]);
        store.commit().await?;

        let contents = tokio::fs::read_to_string(&path).await?;
        assert_eq!(contents, format!("{HEADER}\nnew\n"));
        Ok(())
    }
}
