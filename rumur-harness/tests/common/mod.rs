use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn test_root() -> TempDir {
  tempfile::tempdir().expect("tempdir")
}

/// Write a `/bin/sh` script and mark it executable.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
  path.to_path_buf()
}

/// A probe that prints `literal` and exits 0.
#[allow(dead_code)]
pub fn write_probe(root: &Path, name: &str, literal: &str) -> PathBuf {
  write_script(
    &root.join("config").join(name),
    &format!("cat <<'LITERAL'\n{literal}\nLITERAL"),
  )
}
