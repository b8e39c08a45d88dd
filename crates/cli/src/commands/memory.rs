//! `evaloop memory`: inspect the memory store.

use evaloop_config::AppConfig;

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let memory = evaloop_capabilities::memory_from_config(&config)?;

    println!("Memory statistics");
    println!("=================");
    println!("  Backend:  {}", memory.name());
    println!("  Entries:  {}", memory.count().await?);
    if config.memory.backend == "file" {
        let path = config.memory.resolved_path();
        match std::fs::metadata(&path) {
            Ok(meta) => println!("  File:     {} ({:.1} KB)", path.display(), meta.len() as f64 / 1024.0),
            Err(_) => println!("  File:     {} (not created yet)", path.display()),
        }
    }

    Ok(())
}

pub async fn search(query: &str, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let memory = evaloop_capabilities::memory_from_config(&config)?;
    let limit = limit.unwrap_or(config.memory.search_limit);

    println!("Searching memories for: \"{query}\"\n");

    let hits = memory.search(query, limit).await?;
    if hits.is_empty() {
        println!("  No memories found.");
    }
    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit.content.chars().take(80).collect();
        println!("  {:>2}. [score: {:.2}] {preview}", i + 1, hit.score);
    }

    Ok(())
}
