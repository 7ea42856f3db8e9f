// src/remote_command_handler/handlers/common.rs
// ============================================
// Common utilities for handlers
// ============================================

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::utils::system::home_dir;

/// Expand a leading `~` to the agent user's home directory.
///
/// Only `~` and `~/...` are expanded; `~user` is left alone. An empty path
/// means the filesystem root.
pub fn expand_path(path: &str) -> PathBuf {
    expand_path_with(path, home_dir())
}

pub(crate) fn expand_path_with(path: &str, home: Option<PathBuf>) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from("/");
    }

    if let Some(home) = home {
        if path == "~" {
            return home;
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }

    Path::new(path).to_path_buf()
}

/// Render `ls -l` style permissions, e.g. `drwxr-xr-x`
#[cfg(unix)]
pub fn format_mode(metadata: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        'd'
    } else if file_type.is_symlink() {
        'l'
    } else if file_type.is_fifo() {
        'p'
    } else if file_type.is_socket() {
        's'
    } else if file_type.is_char_device() {
        'c'
    } else if file_type.is_block_device() {
        'b'
    } else {
        '-'
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    out.push_str(&permission_bits(metadata.permissions().mode()));
    out
}

#[cfg(not(unix))]
pub fn format_mode(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() { 'd' } else { '-' };
    let perms = if metadata.permissions().readonly() { "r--r--r--" } else { "rw-rw-rw-" };
    format!("{}{}", kind, perms)
}

/// The nine permission characters, with setuid/setgid/sticky folded in
pub(crate) fn permission_bits(mode: u32) -> String {
    const SETUID: u32 = 0o4000;
    const SETGID: u32 = 0o2000;
    const STICKY: u32 = 0o1000;

    let triplet = |shift: u32, special: bool, set: char, unset: char| {
        let bits = (mode >> shift) & 0o7;
        let r = if bits & 0o4 != 0 { 'r' } else { '-' };
        let w = if bits & 0o2 != 0 { 'w' } else { '-' };
        let x = match (bits & 0o1 != 0, special) {
            (true, true) => set,
            (false, true) => unset,
            (true, false) => 'x',
            (false, false) => '-',
        };
        [r, w, x]
    };

    triplet(6, mode & SETUID != 0, 's', 'S')
        .iter()
        .chain(triplet(3, mode & SETGID != 0, 's', 'S').iter())
        .chain(triplet(0, mode & STICKY != 0, 't', 'T').iter())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", None, "/" ; "empty is root")]
    #[test_case("~", Some("/home/ops"), "/home/ops" ; "bare tilde")]
    #[test_case("~/logs/app.log", Some("/home/ops"), "/home/ops/logs/app.log" ; "tilde prefix")]
    #[test_case("~other/x", Some("/home/ops"), "~other/x" ; "other user untouched")]
    #[test_case("/var/log", Some("/home/ops"), "/var/log" ; "absolute untouched")]
    #[test_case("~/x", None, "~/x" ; "no home available")]
    fn test_expand_path(input: &str, home: Option<&str>, expected: &str) {
        assert_eq!(expand_path_with(input, home.map(PathBuf::from)), PathBuf::from(expected));
    }

    #[test_case(0o755, "rwxr-xr-x")]
    #[test_case(0o644, "rw-r--r--")]
    #[test_case(0o4755, "rwsr-xr-x" ; "setuid")]
    #[test_case(0o2644, "rw-r-Sr--" ; "setgid without exec")]
    #[test_case(0o1777, "rwxrwxrwt" ; "sticky")]
    #[test_case(0o1666, "rw-rw-rwT" ; "sticky without exec")]
    fn test_permission_bits(mode: u32, expected: &str) {
        assert_eq!(permission_bits(mode), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_format_mode_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o750)).unwrap();
        let metadata = std::fs::metadata(dir.path()).unwrap();
        assert_eq!(format_mode(&metadata), "drwxr-x---");
    }
}
