use chrono::Utc;

use crate::artifacts::{ArtifactManifest, ArtifactStore};
use crate::core::error::ShipResult;

/// List stored artifacts with their expiry
pub fn run_artifacts_list(store: &ArtifactStore, json: bool) -> ShipResult<()> {
  let manifests = store.list()?;

  if json {
    println!("{}", serde_json::to_string_pretty(&manifests)?);
    return Ok(());
  }

  if manifests.is_empty() {
    println!("📦 No artifacts in {}", store.root().display());
    return Ok(());
  }

  let now = Utc::now();
  println!("📦 {} artifact(s) in {}\n", manifests.len(), store.root().display());
  for manifest in &manifests {
    print_manifest(manifest, manifest.is_expired(now));
  }
  Ok(())
}

/// Delete expired artifacts
pub fn run_artifacts_prune(store: &ArtifactStore, dry_run: bool, json: bool) -> ShipResult<()> {
  let now = Utc::now();
  let affected = if dry_run { store.expired(now)? } else { store.prune(now)? };

  if json {
    println!("{}", serde_json::to_string_pretty(&affected)?);
    return Ok(());
  }

  if affected.is_empty() {
    println!("✅ No expired artifacts");
    return Ok(());
  }

  let verb = if dry_run { "Would remove" } else { "Removed" };
  println!("🧹 {} {} expired artifact(s):\n", verb, affected.len());
  for manifest in &affected {
    print_manifest(manifest, true);
  }
  if dry_run {
    println!("\n💡 Run without --dry-run to delete them.");
  }
  Ok(())
}

fn print_manifest(manifest: &ArtifactManifest, expired: bool) {
  let state = if expired { "expired" } else { "expires" };
  println!(
    "   • {} [{}] {} file(s), {} bytes, {} {}",
    manifest.name,
    manifest.run_id,
    manifest.files.len(),
    manifest.total_size(),
    state,
    manifest.expires_at().format("%Y-%m-%d %H:%M UTC")
  );
}
