//! Tests for the `init` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_init_creates_pipeline() -> Result<()> {
  let repo = TestRepo::new()?;
  std::fs::remove_file(repo.path.join(".gitignore"))?;

  run_shipline(&repo.path, &["init"])?;

  let pipeline = repo.read_file("shipline.toml")?;
  assert!(pipeline.contains("[[stages]]"));
  assert!(pipeline.contains("fail_fast = false"));
  assert_eq!(repo.read_file(".gitignore")?, ".shipline/\n");

  // The generated pipeline passes validation as-is
  run_shipline(&repo.path, &["validate"])?;
  Ok(())
}

#[test]
fn test_init_refuses_to_overwrite() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.write_pipeline("# hand written\n")?;

  let output = run_shipline_raw(&repo.path, &["init"], &[])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("--force"));
  assert_eq!(repo.read_file("shipline.toml")?, "# hand written\n");

  run_shipline(&repo.path, &["init", "--force"])?;
  assert!(repo.read_file("shipline.toml")?.contains("[pipeline]"));
  Ok(())
}
