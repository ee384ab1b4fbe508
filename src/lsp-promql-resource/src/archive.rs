//! Safe archive extraction for downloaded release artifacts.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::ExtractionError;

type ExtractResult<T> = std::result::Result<T, ExtractionError>;

fn traversal(entry_name: &str) -> ExtractionError {
    ExtractionError::PathTraversal {
        entry: entry_name.to_string(),
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn canonicalize_existing(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for name in missing.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Validate that an archive entry stays inside the destination directory and
/// return the path it should be written to.
///
/// `dest_dir` must exist.
pub fn validate_path_safe(dest_dir: &Path, entry_name: &str) -> ExtractResult<PathBuf> {
    if entry_name.contains('\0') {
        return Err(traversal(entry_name));
    }

    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() {
        return Err(traversal(entry_name));
    }

    let mut relative = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(name) => relative.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(entry_name));
            }
        }
    }

    // Resolve symlinks in both the root and the already existing part of the
    // target. `starts_with` compares whole components, so `/dest-evil` is not
    // inside `/dest`.
    let canonical_dest = dest_dir.canonicalize()?;
    let target = canonical_dest.join(&relative);
    let resolved = canonicalize_existing(&target)?;

    if !resolved.starts_with(&canonical_dest) {
        return Err(traversal(entry_name));
    }

    Ok(target)
}

fn open_tar_gz(archive_path: &Path) -> io::Result<tar::Archive<flate2::read::GzDecoder<File>>> {
    let file = File::open(archive_path)?;
    Ok(tar::Archive::new(flate2::read::GzDecoder::new(file)))
}

fn entry_name<R: io::Read>(entry: &tar::Entry<'_, R>) -> io::Result<String> {
    Ok(entry.path()?.to_string_lossy().to_string())
}

/// Check every entry of an archive without writing anything.
pub fn validate_tar<R: io::Read>(archive: &mut tar::Archive<R>, dest_dir: &Path) -> ExtractResult<()> {
    for entry_result in archive.entries()? {
        let entry = entry_result?;
        let name = entry_name(&entry)?;
        validate_path_safe(dest_dir, &name)?;
    }
    Ok(())
}

/// Write one regular file next to its final location, then rename it into
/// place so a partially written file never carries the final name.
fn write_atomically<R: io::Read>(
    entry: &mut tar::Entry<'_, R>,
    outpath: &Path,
) -> io::Result<()> {
    let parent = outpath.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent directory")
    })?;
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".extract-")
        .tempfile_in(parent)?;
    io::copy(entry, &mut staged)?;
    staged.as_file().sync_all()?;

    // Preserve permissions on Unix, without setuid/setgid/sticky bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(mode) = entry.header().mode() {
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    staged.persist(outpath).map_err(|e| e.error)?;
    Ok(())
}

/// Unpack a tar stream, validating each entry again before it is written.
pub fn safe_tar_unpack<R: io::Read>(
    archive: &mut tar::Archive<R>,
    dest_dir: &Path,
) -> ExtractResult<()> {
    let canonical_dest = dest_dir.canonicalize()?;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let name = entry_name(&entry)?;
        let outpath = validate_path_safe(dest_dir, &name)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&outpath)?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if outpath == canonical_dest {
                    continue;
                }
                write_atomically(&mut entry, &outpath)?;
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                tracing::warn!("Skipping symlink/hardlink in archive for security: {}", name);
            }
            _ => {
                // Skip other entry types (block devices, char devices, fifos, etc.)
            }
        }
    }
    Ok(())
}

/// Extract a `.tar.gz` archive into `dest_dir`.
///
/// Every entry is validated before the first byte is written; a single
/// escaping entry aborts the whole extraction.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> ExtractResult<()> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = open_tar_gz(archive_path)?;
    validate_tar(&mut archive, dest_dir)?;

    let mut archive = open_tar_gz(archive_path)?;
    safe_tar_unpack(&mut archive, dest_dir)
}

/// Find a binary recursively in a directory.
pub fn find_binary_recursive(dir: &Path, binary_name: &str) -> io::Result<Option<PathBuf>> {
    let exe_name = format!("{}{}", binary_name, std::env::consts::EXE_SUFFIX);

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if (file_name == binary_name || file_name == exe_name) && path.is_file() {
            return Ok(Some(path));
        }

        if path.is_dir() {
            if let Some(found) = find_binary_recursive(&path, binary_name)? {
                return Ok(Some(found));
            }
        }
    }

    Ok(None)
}
