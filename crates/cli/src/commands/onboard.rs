//! `evaloop onboard`: First-time setup.

use evaloop_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let workspace_dir = AppConfig::workspace_dir();

    println!("Evaloop: first-time setup");
    println!("=========================\n");

    for (label, dir) in [
        ("config", &config_dir),
        ("workspace", &workspace_dir),
        ("memory", &config_dir.join("memory")),
    ] {
        if dir.exists() {
            println!("  {label} directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("  Created {label} directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("    1. Point [providers.localai] api_url at your LocalAI or OpenAI-compatible server");
        println!("       (or export OPENAI_API_BASE / OPENAI_API_KEY)");
        println!("    2. Run: evaloop doctor");
        println!("    3. Run: evaloop chat\n");
    }

    Ok(())
}
