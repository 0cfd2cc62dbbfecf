//! Textual path resolution and the home-directory authorization boundary.
//!
//! Resolution is purely lexical: `.` and `..` segments are folded without
//! consulting any filesystem. A `..` that would climb above the root
//! yields `None`, never a partially resolved path. The authorization check
//! is a plain string-prefix test against the user's home directory; the
//! backing store must not alias paths (symlinks, case folding) across that
//! boundary.

/// Resolves `arg` against the current working directory `cwd` into an
/// absolute path. Returns `None` when `..` would escape the root.
pub fn resolve(cwd: &str, arg: &str) -> Option<String> {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), arg)
    };

    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", segments.join("/")))
    }
}

/// Whether `path` lies inside `home`. This prefix test is the whole
/// authorization boundary for a session.
pub fn authorized(path: &str, home: &str) -> bool {
    if home == "/" {
        return path.starts_with('/');
    }
    let home = home.trim_end_matches('/');
    path == home || path.starts_with(&format!("{home}/"))
}
