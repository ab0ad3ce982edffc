//! Image copy diagnostics.
//!
//! Each step logs what it sees so a failed copy can be traced to the
//! listing, the name match, the read, or the write.

#[cfg(test)]
#[path = "copy_test.rs"]
mod copy_test;

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("failed to list {}: {source}", dir.display())]
    List {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{name} not found in {}", dir.display())]
    NotFound { name: String, dir: PathBuf },
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} -> {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("destination holds {actual} bytes, source had {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("source and destination are the same file: {}", .0.display())]
    SamePath(PathBuf),
    #[error("{} has no file name", .0.display())]
    NoFileName(PathBuf),
}

/// Outcome of a successful [`copy_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    /// Directory entry that matched, exactly as listed.
    pub matched: String,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub bytes: u64,
}

/// Entry names of `dir`, sorted.
pub async fn list_dir(dir: &Path) -> Result<Vec<String>, CopyError> {
    let list_err = |source| CopyError::List {
        dir: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(list_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// First entry equal to `target` after trimming, ignoring case.
pub fn find_match<'a>(entries: &'a [String], target: &str) -> Option<&'a str> {
    let wanted = target.to_lowercase();
    entries
        .iter()
        .map(String::as_str)
        .find(|name| name.trim().to_lowercase() == wanted)
}

/// UTF-16 code units of `name`, comma separated. Exposes invisible or
/// look-alike characters hiding in a file name.
pub fn char_codes(name: &str) -> String {
    name.encode_utf16()
        .map(|unit| unit.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Length of `name` in UTF-16 code units.
pub fn display_len(name: &str) -> usize {
    name.encode_utf16().count()
}

async fn file_size(path: &Path) -> Result<u64, CopyError> {
    fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|source| CopyError::Stat {
            path: path.to_path_buf(),
            source,
        })
}

/// Whether `from` and `to` resolve to the same file. A missing `to` never
/// matches.
async fn same_file(from: &Path, to: &Path) -> Result<bool, CopyError> {
    let stat_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| CopyError::Stat { path, source }
    };
    let from = fs::canonicalize(from).await.map_err(stat_err(from))?;
    match fs::canonicalize(to).await {
        Ok(to) => Ok(from == to),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(stat_err(to)(err)),
    }
}

/// Stream `from` into `to`, returning the number of bytes written. Refuses
/// to open `to` when it is `from`, since creating it would truncate the
/// source.
pub async fn stream_copy(from: &Path, to: &Path) -> Result<u64, CopyError> {
    if same_file(from, to).await? {
        return Err(CopyError::SamePath(to.to_path_buf()));
    }
    let copy_err = |source| CopyError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let mut reader = File::open(from).await.map_err(copy_err)?;
    let mut writer = File::create(to).await.map_err(copy_err)?;
    let written = tokio::io::copy(&mut reader, &mut writer).await.map_err(copy_err)?;
    writer.flush().await.map_err(copy_err)?;
    Ok(written)
}

/// Find `target` in `src_dir` and stream it to `dest_dir/dest_name`, then
/// check the destination size against the source.
pub async fn copy_image(
    src_dir: &Path,
    dest_dir: &Path,
    target: &str,
    dest_name: &str,
) -> Result<CopyReport, CopyError> {
    let entries = list_dir(src_dir).await?;
    info!(dir = %src_dir.display(), count = entries.len(), "listed source directory");

    let Some(matched) = find_match(&entries, target) else {
        error!(file = target, dir = %src_dir.display(), "file not found");
        for name in &entries {
            info!("- {name:?} ({})", display_len(name));
        }
        return Err(CopyError::NotFound {
            name: target.to_owned(),
            dir: src_dir.to_path_buf(),
        });
    };
    info!(matched, codes = %char_codes(matched), "found match");

    let source = src_dir.join(matched);
    let dest = dest_dir.join(dest_name);
    let expected = file_size(&source).await?;
    info!(bytes = expected, "source file size");

    info!(from = %source.display(), to = %dest.display(), "stream copy");
    stream_copy(&source, &dest).await?;

    let actual = file_size(&dest).await?;
    info!(bytes = actual, "destination file size");
    if actual != expected {
        return Err(CopyError::SizeMismatch { expected, actual });
    }

    Ok(CopyReport {
        matched: matched.to_owned(),
        source,
        dest,
        bytes: actual,
    })
}

/// `<stem>_copy.<ext>` next to `file`.
pub fn copy_name(file: &Path) -> Result<PathBuf, CopyError> {
    let stem = file
        .file_stem()
        .ok_or_else(|| CopyError::NoFileName(file.to_path_buf()))?
        .to_string_lossy();
    let name = match file.extension() {
        Some(ext) => format!("{stem}_copy.{}", ext.to_string_lossy()),
        None => format!("{stem}_copy"),
    };
    Ok(file.with_file_name(name))
}

/// Copy `file` inside `dest_dir` to its `_copy` sibling, proving the
/// directory is writable. A missing file is reported and skipped.
pub async fn self_test(dest_dir: &Path, file: &str) -> Result<Option<PathBuf>, CopyError> {
    let from = dest_dir.join(file);
    let exists = fs::try_exists(&from).await.map_err(|source| CopyError::Stat {
        path: from.clone(),
        source,
    })?;
    if !exists {
        warn!(file, "not found for test copy");
        return Ok(None);
    }
    let to = copy_name(&from)?;
    fs::copy(&from, &to).await.map_err(|source| CopyError::Copy {
        from: from.clone(),
        to: to.clone(),
        source,
    })?;
    info!(from = %from.display(), to = %to.display(), "test copy succeeded");
    Ok(Some(to))
}
