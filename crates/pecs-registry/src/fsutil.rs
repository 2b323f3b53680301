//! Atomic file replacement shared by the installer and the manager state file,
//! plus the path checks applied to names taken from remote indexes.

use std::io::{self, Read, Write};
use std::path::{Component, Path};

/// Atomically replace `target` with the contents of `reader`.
///
/// The data is written to a temporary file in the same directory and renamed
/// over `target`, so readers never observe a partially written file. On Unix
/// the file receives `mode` before the rename.
pub(crate) fn replace_file(target: &Path, reader: &mut impl Read, mode: u32) -> io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    io::copy(reader, tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    set_mode(tmp.path(), mode)?;

    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically write `bytes` to `target`.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8], mode: u32) -> io::Result<()> {
    replace_file(target, &mut io::Cursor::new(bytes), mode)
}

/// Whether `name` can be used as a single file name: not empty, no path
/// separators, not `.` or `..`.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', ':']) && name != "." && name != ".."
}

/// Whether `path` is relative and stays below the directory it is joined to.
/// Slashes and backslashes both count as separators, so Windows paths are
/// checked on every host.
pub(crate) fn is_contained_relative(path: &str) -> bool {
    if path.is_empty() || path.contains(':') || Path::new(path).is_absolute() {
        return false;
    }
    if path.starts_with(['/', '\\']) {
        return false;
    }
    path.split(['/', '\\']).all(|part| part != "..")
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
