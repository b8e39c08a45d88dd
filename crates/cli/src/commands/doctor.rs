//! `evaloop doctor`: Diagnose configuration and connectivity.

use evaloop_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Evaloop doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file, using defaults (run `evaloop onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load().and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    let router = evaloop_providers::build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  [ok]   Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  [fail] Provider '{}' answered but is unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  [fail] Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  [fail] No default provider");
            issues += 1;
        }
    }

    match evaloop_capabilities::memory_from_config(&config) {
        Ok(memory) => match memory.count().await {
            Ok(count) => println!("  [ok]   Memory store '{}' holds {count} entries", memory.name()),
            Err(e) => {
                println!("  [fail] Memory store unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Memory store: {e}");
            issues += 1;
        }
    }

    let workspace = config.capabilities.resolved_workspace();
    if workspace.exists() {
        println!("  [ok]   Workspace {}", workspace.display());
    } else {
        println!("  [warn] Workspace {} does not exist yet", workspace.display());
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
