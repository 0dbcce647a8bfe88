//! Small helpers shared across modules

use std::path::Path;

/// Whether a push remote points at the local filesystem
///
/// Filesystem remotes never see an HTTP auth header, so push skips the token
/// for them. Bare remote names (`origin`) are not paths.
pub fn is_local_path(remote: &str) -> bool {
  if remote.is_empty() {
    return false;
  }
  if remote.starts_with("file://") || remote.starts_with("./") || remote.starts_with("../") {
    return true;
  }
  if remote.contains("://") || remote.contains('@') {
    return false;
  }

  // C:\repo, C:/repo and \\server\share
  let bytes = remote.as_bytes();
  let drive = bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && matches!(bytes[2], b'\\' | b'/');
  drive || remote.starts_with("\\\\") || remote.starts_with('/') || Path::new(remote).is_absolute()
}

/// Convert a path to Git format (always forward slashes)
pub fn path_to_git_format(path: &Path) -> String {
  #[cfg(target_os = "windows")]
  {
    path.to_string_lossy().replace('\\', "/")
  }
  #[cfg(not(target_os = "windows"))]
  {
    path.to_string_lossy().to_string()
  }
}

/// Milliseconds in a duration, saturating
pub fn duration_ms(duration: std::time::Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
