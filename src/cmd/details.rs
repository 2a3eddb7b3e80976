use std::path::Path;

use anyhow::Result;

use vidbridge::BackendRegistry;

pub async fn cmd_details(config_path: &Path, backend: &str, id: &str, json: bool) -> Result<()> {
    let registry = BackendRegistry::new(config_path)?;
    let details = registry.get_details(backend, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    println!("🎬 {}", details.title);
    println!("   ID: {}", details.id);
    println!("   Backend: {backend}");
    println!("   Duration: {}s", details.duration);
    if !details.format.is_empty() {
        println!("   Format: {}", details.format);
    }
    if !details.download_url.is_empty() {
        println!("   URL: {}", details.download_url);
    }
    if !details.description.is_empty() {
        println!("\n{}", details.description);
    }

    Ok(())
}
