//! Filesystem helpers shared by the claimer, finalizer and scanner.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `cwd` and resolve `.` and `..` lexically.
///
/// Symlinks are not followed, so `./out`, `out` and `in/../out` all compare
/// equal but a symlink to `out` does not.
pub(crate) fn normalize(path: &Path, cwd: Option<&Path>) -> PathBuf {
    let joined;
    let path = match cwd {
        Some(cwd) if path.is_relative() => {
            joined = cwd.join(path);
            joined.as_path()
        }
        _ => path,
    };

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Move `from` to `to`, failing with [`ErrorKind::AlreadyExists`] instead of
/// replacing an existing `to`.
///
/// The new name is created with a hard link, which the operating system
/// refuses atomically when the name is taken, and the old name is removed
/// afterwards. If the old name vanished in between, somebody else moved the
/// file first: the link is undone and `NotFound` is returned.
pub(crate) fn rename_no_replace(from: &Path, to: &Path) -> io::Result<()> {
    fs::hard_link(from, to)?;
    match fs::remove_file(from) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(to);
            Err(e)
        }
    }
}

/// Whether `err` means the destination name is already taken.
pub(crate) fn is_occupied(err: &io::Error) -> bool {
    err.kind() == ErrorKind::AlreadyExists
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize() {
        let cwd = Path::new("/work");
        assert_eq!(normalize(Path::new("./out"), Some(cwd)), PathBuf::from("/work/out"));
        assert_eq!(normalize(Path::new("out/a.txt"), Some(cwd)), PathBuf::from("/work/out/a.txt"));
        assert_eq!(normalize(Path::new("in/../out"), Some(cwd)), PathBuf::from("/work/out"));
        assert_eq!(normalize(Path::new("/a/./b/../c"), Some(cwd)), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../x"), None), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("../x/./y"), None), PathBuf::from("../x/y"));
    }

    #[test]
    fn test_rename_no_replace() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.dat");
        let to = temp_dir.path().join("b.dat");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "in flight").unwrap();

        let err = rename_no_replace(&from, &to).unwrap_err();
        assert!(is_occupied(&err));
        assert_eq!(fs::read_to_string(&to).unwrap(), "in flight");
        assert!(from.exists());

        fs::remove_file(&to).unwrap();
        rename_no_replace(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
    }

    #[test]
    fn test_rename_no_replace_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let err = rename_no_replace(&temp_dir.path().join("gone"), &temp_dir.path().join("b"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
