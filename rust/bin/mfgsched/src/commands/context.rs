//! Context management commands.

use std::path::Path;

use anyhow::Result;
use mfgsuite_client::{ClientConfig, Context};

/// Properties accepted by `context set`. `None` leaves a field alone.
#[derive(Debug, Default)]
pub struct ContextProps {
    pub server: Option<String>,
    pub ws_server: Option<String>,
    pub tenant: Option<String>,
    pub board: Option<String>,
    pub token: Option<String>,
}

/// List all contexts.
pub fn list(client_config_path: &Path) -> Result<()> {
    let config = ClientConfig::load(client_config_path)?;

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!("Run: mfgsched context set <name> --server <url>");
        return Ok(());
    }

    println!("{:2} {:16} {:36} {:12} {:12}", "", "NAME", "SERVER", "TENANT", "BOARD");
    for ctx in &config.contexts {
        let marker = if ctx.name == config.current_context {
            "*"
        } else {
            " "
        };
        let dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        println!(
            "{:2} {:16} {:36} {:12} {:12}",
            marker,
            ctx.name,
            dash(&ctx.server),
            dash(&ctx.tenant),
            ctx.board_id()
        );
    }

    Ok(())
}

/// Switch current context.
pub fn use_context(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if config.get(name).is_none() {
        anyhow::bail!(
            "Context \"{}\" not found. Run `mfgsched context list` to see available contexts.",
            name
        );
    }

    config.current_context = name.to_string();
    config.save(client_config_path)?;
    println!("Switched to context \"{}\".", name);
    Ok(())
}

/// Create a context or update its properties. The first context created
/// becomes current.
pub fn set(name: &str, props: ContextProps, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    let created = config.get(name).is_none();
    let mut ctx = config.get(name).cloned().unwrap_or_else(|| Context::new(name));
    if let Some(s) = props.server {
        ctx.server = s.trim_end_matches('/').to_string();
    }
    if let Some(s) = props.ws_server {
        ctx.ws_server = s.trim_end_matches('/').to_string();
    }
    if let Some(t) = props.tenant {
        ctx.tenant = t;
    }
    if let Some(b) = props.board {
        ctx.board = b;
    }
    if let Some(t) = props.token {
        ctx.token = t;
    }
    config.upsert_context(ctx);
    if config.current_context.is_empty() {
        config.current_context = name.to_string();
    }

    config.save(client_config_path)?;
    if created {
        println!("Context \"{}\" created.", name);
    } else {
        println!("Context \"{}\" updated.", name);
    }
    Ok(())
}

/// Delete a context.
pub fn delete(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if !config.remove_context(name) {
        anyhow::bail!("Context \"{}\" not found.", name);
    }

    config.save(client_config_path)?;
    println!("Context \"{}\" deleted.", name);
    Ok(())
}
