use chrono::DateTime;
use serde::Serialize;

use crate::ports::RemoteEntry;

const MOD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry of a directory listing as returned to HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// Octal permission bits, e.g. `0644`
    pub mode: String,
    /// UTC, `%Y-%m-%d %H:%M:%S`; empty when the server did not report it
    pub mod_time: String,
    /// `ls -l` style, e.g. `drwxr-xr-x`
    pub permissions: String,
}

impl FileInfo {
    #[must_use]
    pub fn from_entry(dir: &str, entry: RemoteEntry) -> Self {
        let path = join_remote(dir, &entry.name);
        Self {
            mode: format!("{:04o}", entry.permissions & 0o7777),
            mod_time: entry
                .mtime
                .and_then(|secs| DateTime::from_timestamp(i64::from(secs), 0))
                .map(|t| t.format(MOD_TIME_FORMAT).to_string())
                .unwrap_or_default(),
            permissions: permission_string(entry.is_dir, entry.is_symlink, entry.permissions),
            name: entry.name,
            path,
            size: entry.size,
            is_dir: entry.is_dir,
        }
    }
}

/// Join a remote directory and a name with POSIX separators.
#[must_use]
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Render permission bits the way `ls -l` does.
#[must_use]
pub fn permission_string(is_dir: bool, is_symlink: bool, mode: u32) -> String {
    let kind = if is_symlink {
        'l'
    } else if is_dir {
        'd'
    } else {
        '-'
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for (shift, special, special_char) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => special_char,
            (true, false) => special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// Directories first, then by name.
pub fn sort_listing(entries: &mut [FileInfo]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}
