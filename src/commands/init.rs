use std::fs;
use std::path::Path;

use crate::core::config::{DEFAULT_PIPELINE, PipelineConfig};
use crate::core::context::STATE_DIR;
use crate::core::error::{ShipError, ShipResult, ResultExt};

/// Write the default release pipeline to `shipline.toml`
pub fn run_init(root: &Path, force: bool) -> ShipResult<()> {
  if let Some(existing) = PipelineConfig::find_config_path(root)
    && !force
  {
    return Err(ShipError::with_help(
      format!("Pipeline already exists at {}", existing.display()),
      "Pass --force to overwrite it with the default pipeline.",
    ));
  }

  let path = root.join("shipline.toml");
  fs::write(&path, DEFAULT_PIPELINE).with_context(|| format!("Failed to write {}", path.display()))?;
  println!("✅ Wrote default release pipeline to {}", path.display());

  if ensure_ignored(root)? {
    println!("📝 Added {}/ to .gitignore", STATE_DIR);
  }

  println!("\n💡 Next steps:");
  println!("   1. Adjust [[version_files]] and the stage commands for your project");
  println!("   2. Run 'shipline validate' to check the pipeline");
  println!("   3. Run 'shipline plan --version <VERSION> ...' to preview a release");
  Ok(())
}

/// Keep run state out of release commits; returns whether .gitignore changed
fn ensure_ignored(root: &Path) -> ShipResult<bool> {
  let gitignore = root.join(".gitignore");
  let entry = format!("{}/", STATE_DIR);

  let mut content = if gitignore.exists() {
    fs::read_to_string(&gitignore).with_context(|| format!("Failed to read {}", gitignore.display()))?
  } else {
    String::new()
  };

  if content.lines().any(|l| l.trim() == entry || l.trim() == STATE_DIR) {
    return Ok(false);
  }

  if !content.is_empty() && !content.ends_with('\n') {
    content.push('\n');
  }
  content.push_str(&entry);
  content.push('\n');
  fs::write(&gitignore, content).with_context(|| format!("Failed to write {}", gitignore.display()))?;
  Ok(true)
}
