use std::path::Path;

use anyhow::Result;

use vidbridge::BackendRegistry;

pub async fn cmd_search(config_path: &Path, query: &str, max_duration: Option<f64>, json: bool) -> Result<()> {
    let registry = BackendRegistry::new(config_path)?;
    let results = registry.search_all(query, max_duration).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("❌ No results from any enabled backend for: {query}");
        return Ok(());
    }

    let backend = results[0].backend_id.as_deref().unwrap_or("?");
    println!("🔎 {} result(s) from {backend}\n", results.len());
    for result in &results {
        println!("{}  {}", result.id, result.title);
        println!("   {}:{:02}  {}", minutes(result.duration), seconds(result.duration), result.published_at);
        if let Some(url) = &result.source_url {
            println!("   {url}");
        }
    }

    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn minutes(duration: f64) -> u64 {
    (duration.max(0.0) as u64) / 60
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds(duration: f64) -> u64 {
    (duration.max(0.0) as u64) % 60
}
