pub mod board;
pub mod context;
pub mod login;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use mfgsuite_client::{
    ClientConfig, Context, CredentialSource, DEMO_BOARD_ID, HttpSource, MemorySource,
    NoCredentials, PasswordLogin, ScheduleSource, StaticCredentials,
};
use mfgsuite_sync::SessionConfig;

/// Username and password for a per-command login.
pub struct SignIn {
    pub username: String,
    pub password: String,
}

/// Where board reads and writes go for one command.
pub struct Backend {
    pub board_id: String,
    pub source: Arc<dyn ScheduleSource>,
    pub credentials: Arc<dyn CredentialSource>,
    /// Live channel base URL; `None` for the demo board.
    pub live_base: Option<String>,
}

impl Backend {
    /// Backend of the current context, or the demo board when `demo` is set.
    ///
    /// With `sign_in`, requests authenticate through a password login that
    /// renews its token on expiry; otherwise the context's saved token is used.
    pub fn open(
        config_path: &Path,
        demo: bool,
        board: Option<&str>,
        sign_in: Option<SignIn>,
    ) -> Result<Self> {
        if demo {
            return Ok(Self::demo(board));
        }
        let config = ClientConfig::load(config_path)?;
        let ctx = current_context(&config)?;
        if ctx.server.is_empty() {
            anyhow::bail!(
                "No server URL set for context \"{}\". Run `mfgsched context set {} --server <url>`.",
                ctx.name,
                ctx.name
            );
        }
        let credentials: Arc<dyn CredentialSource> = match sign_in {
            Some(s) => Arc::new(PasswordLogin::new(
                &ctx.server,
                s.username,
                s.password,
                ctx.request_context().tenant_id,
            )),
            None => Arc::new(StaticCredentials::new(ctx.request_context())),
        };
        Ok(Self {
            board_id: board.unwrap_or(ctx.board_id()).to_string(),
            source: Arc::new(HttpSource::new(&ctx.server)?),
            credentials,
            live_base: Some(ctx.live_base().to_string()),
        })
    }

    pub fn demo(board: Option<&str>) -> Self {
        Self {
            board_id: board.unwrap_or(DEMO_BOARD_ID).to_string(),
            source: Arc::new(MemorySource::demo(chrono::Utc::now())),
            credentials: Arc::new(NoCredentials),
            live_base: None,
        }
    }

    pub fn session_config(&self, editable: bool) -> SessionConfig {
        SessionConfig {
            board_id: self.board_id.clone(),
            editable,
            ..Default::default()
        }
    }
}

pub fn current_context(config: &ClientConfig) -> Result<Context> {
    config.current().cloned().ok_or_else(|| {
        anyhow::anyhow!("No current context. Run `mfgsched use context <name>` or pass --demo.")
    })
}
