//! `chatitp check-config`: validation report plus the effective config.

use std::path::Path;

use anyhow::{bail, Result};
use chatitp_config::{config_file_path, redact, validate};

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let path = config_file_path(config_path);
    println!("\n🔍 Checking ChatITP configuration ({})\n", path.display());

    let config = chatitp_config::load(Some(&path)).await?;
    let report = validate(&config);

    for warning in &report.warnings {
        println!("  🟡 {}: {}", warning.path, warning.message);
    }
    for error in &report.errors {
        println!("  🔴 {}: {}", error.path, error.message);
    }

    let effective = redact(&serde_json::to_value(&config)?);
    println!("\nEffective configuration:\n{}", serde_json::to_string_pretty(&effective)?);

    println!();
    if report.is_valid() {
        println!("✅ Configuration is valid.");
        Ok(())
    } else {
        bail!("{} configuration error(s)", report.errors.len())
    }
}
