use std::path::Path;

use anyhow::{Context, Result};

use vidbridge::BackendsConfig;

pub fn cmd_backends(config_path: &Path, json: bool) -> Result<()> {
    let config = BackendsConfig::load(config_path)?;

    if json {
        let text = serde_json::to_string_pretty(&config).context("failed to serialize config")?;
        println!("{text}");
        return Ok(());
    }

    println!("📄 {}", config_path.display());
    if config.providers.is_empty() {
        println!("❌ No backends configured");
        return Ok(());
    }

    let mut providers: Vec<_> = config.providers.iter().collect();
    providers.sort_by(|a, b| {
        (!a.enabled)
            .cmp(&!b.enabled)
            .then(a.priority_rank().total_cmp(&b.priority_rank()))
    });

    for provider in providers {
        let status = if provider.enabled { "✅" } else { "⏸️ " };
        println!(
            "{status} {:<12} priority {:>3}  {}",
            provider.id,
            provider.priority.to_string(),
            provider.name
        );
        println!("      {} {}", provider.command, provider.args.join(" "));
    }

    Ok(())
}
