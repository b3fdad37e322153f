//! Login / logout / me commands.

use std::path::Path;

use anyhow::Result;
use mfgsuite_client::{ClientConfig, HttpSource, PasswordLogin};

use super::current_context;

/// Login to the current context's server and save the token.
pub async fn login(username: &str, password: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;
    let ctx = current_context(&config)?;

    if ctx.server.is_empty() {
        anyhow::bail!(
            "No server URL set for context \"{}\". Run `mfgsched context set {} --server <url>`.",
            ctx.name,
            ctx.name
        );
    }

    let tenant = (!ctx.tenant.is_empty()).then(|| ctx.tenant.clone());
    let resp = PasswordLogin::new(&ctx.server, username, password, tenant)
        .login()
        .await?;

    let ctx_mut = config
        .get_mut(&ctx.name)
        .ok_or_else(|| anyhow::anyhow!("Context disappeared"))?;
    ctx_mut.token = resp.access_token;
    config.save(client_config_path)?;

    println!("Logged in as {}.", username);
    if !resp.roles.is_empty() {
        println!("Roles: {}", resp.roles.join(", "));
    }
    println!("Token saved to context \"{}\".", ctx.name);
    Ok(())
}

/// Clear the token from the current context.
pub fn logout(client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    let current_name = config.current_context.clone();
    if current_name.is_empty() {
        anyhow::bail!("No current context.");
    }

    let ctx = config
        .get_mut(&current_name)
        .ok_or_else(|| anyhow::anyhow!("Current context not found."))?;

    ctx.token.clear();
    config.save(client_config_path)?;
    println!("Logged out from context \"{}\".", current_name);
    Ok(())
}

/// Print the current actor's roles and whether they may edit the schedule.
pub async fn me(client_config_path: &Path, demo: bool) -> Result<()> {
    if demo {
        anyhow::bail!("The demo board has no accounts; `me` needs a server.");
    }
    let config = ClientConfig::load(client_config_path)?;
    let ctx = current_context(&config)?;
    let source = HttpSource::new(&ctx.server)?;
    let roles = source.me(&ctx.request_context()).await?;

    if roles.as_slice().is_empty() {
        println!("Roles: -");
    } else {
        println!("Roles: {}", roles.as_slice().join(", "));
    }
    let edit = if roles.can_edit_schedule() {
        "allowed"
    } else {
        "read-only"
    };
    println!("Schedule editing: {}", edit);
    Ok(())
}
