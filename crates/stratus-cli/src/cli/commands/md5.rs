//! `stratus md5` – Content-MD5 of a local file.

use anyhow::Result;
use std::path::Path;
use stratus_core::checksum;

/// Print the base64 MD5 the service would report for this file.
pub async fn run_md5(path: &Path) -> Result<()> {
    let digest = checksum::md5_base64_path(path)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
