// [[RARO]]/apps/telemetry-server/src/fs_manager.rs
// Purpose: Filesystem helpers for tailing transcripts and locating task output.
// Architecture: Infrastructure Helper Layer.
// Dependencies: std::fs, tokio::fs

use std::fs;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Outcome of reading a file past a known offset.
#[derive(Debug, PartialEq)]
pub enum ReadDelta {
    /// Nothing new since the offset
    Unchanged,
    /// Bytes appended since the offset, and the offset after them
    Appended { bytes: Vec<u8>, new_offset: u64 },
    /// The file shrank below the offset
    Truncated { len: u64 },
}

/// Files in `dir` with the given extension, most recently modified first.
pub fn recent_files(dir: &Path, extension: &str, limit: usize) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !has_extension(&path, extension) {
            continue;
        }
        // Files can vanish between listing and stat; skip them.
        match entry.metadata().and_then(|m| m.modified()) {
            Ok(mtime) => files.push((mtime, path)),
            Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
        }
    }

    files.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(files.into_iter().take(limit).map(|(_, p)| p).collect())
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

/// Read everything between `offset` and the current end of the file.
pub async fn read_delta(path: &Path, offset: u64) -> io::Result<ReadDelta> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    if len < offset {
        return Ok(ReadDelta::Truncated { len });
    }
    if len == offset {
        return Ok(ReadDelta::Unchanged);
    }

    file.seek(SeekFrom::Start(offset)).await?;
    let mut bytes = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut bytes).await?;

    let new_offset = offset + bytes.len() as u64;
    Ok(ReadDelta::Appended { bytes, new_offset })
}

/// Follow a task output symlink to the file that actually holds the output.
/// Relative link targets resolve against the link's directory.
pub fn resolve_output_file(path: &Path) -> io::Result<PathBuf> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.file_type().is_symlink() {
        return Ok(path.to_path_buf());
    }

    let target = fs::read_link(path)?;
    let resolved = if target.is_absolute() {
        target
    } else {
        path.parent().unwrap_or_else(|| Path::new(".")).join(target)
    };

    if !resolved.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Output target {} is missing", resolved.display()),
        ));
    }
    Ok(resolved)
}

pub fn system_time_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Creation and modification times in ms. Creation falls back to the
/// modification time on filesystems that do not record it.
pub fn file_times(meta: &fs::Metadata) -> io::Result<(i64, i64)> {
    let modified = meta.modified()?;
    let created = meta.created().unwrap_or(modified);
    Ok((system_time_millis(created), system_time_millis(modified)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn recent_files_orders_by_mtime_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (i, name) in ["a.jsonl", "b.jsonl", "c.jsonl"].iter().enumerate() {
            let path = dir.path().join(name);
            let file = fs::File::create(&path).unwrap();
            file.set_modified(now - Duration::from_secs(100 - i as u64 * 10)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = recent_files(dir.path(), "jsonl", 2).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["c.jsonl", "b.jsonl"]);
    }

    #[tokio::test]
    async fn read_delta_tracks_appends_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "one\n").unwrap();

        assert_eq!(read_delta(&path, 4).await.unwrap(), ReadDelta::Unchanged);

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"two\n").unwrap();
        assert_eq!(
            read_delta(&path, 4).await.unwrap(),
            ReadDelta::Appended {
                bytes: b"two\n".to_vec(),
                new_offset: 8
            }
        );

        fs::write(&path, "x").unwrap();
        assert_eq!(read_delta(&path, 8).await.unwrap(), ReadDelta::Truncated { len: 1 });
    }

    #[cfg(unix)]
    #[test]
    fn relative_symlinks_resolve_against_their_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.log");
        fs::write(&target, "out").unwrap();
        let link = dir.path().join("abc.output");
        std::os::unix::fs::symlink("real.log", &link).unwrap();

        let resolved = resolve_output_file(&link).unwrap();
        assert_eq!(fs::read_to_string(resolved).unwrap(), "out");

        fs::remove_file(&target).unwrap();
        assert!(resolve_output_file(&link).is_err());
    }
}
