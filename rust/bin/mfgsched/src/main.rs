//! `mfgsched`: scheduling board CLI.
//!
//! Manages contexts and credentials, prints a board, moves operations, and
//! follows a board's live channel.

mod commands;

use clap::{Parser, Subcommand};
use mfgsuite_client::ClientConfig;

/// Scheduling board CLI.
#[derive(Parser, Debug)]
#[command(name = "mfgsched", about = "Manufacturing scheduling board CLI")]
struct Cli {
    /// Path to client config file (default: ~/.mfgsuite/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    /// Use the built-in demo board instead of a server.
    #[arg(long, global = true)]
    demo: bool,

    /// Log in as this user for the command instead of using the saved
    /// token. The password is prompted for.
    #[arg(long = "as-user", global = true)]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage contexts.
    #[command(name = "context")]
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Switch the current context.
    #[command(name = "use")]
    Use {
        #[command(subcommand)]
        what: UseWhat,
    },

    /// Login to the current context's server and store the token.
    Login {
        #[arg(long)]
        user: Option<String>,
        /// Password (prompted for when omitted).
        #[arg(long)]
        password: Option<String>,
    },

    /// Clear the token from the current context.
    Logout,

    /// Show the current actor's roles.
    Me,

    /// Print a board.
    Board {
        /// Board id (default: the context's board).
        #[arg(long)]
        board: Option<String>,
    },

    /// Move, resize, or reassign an operation.
    Move {
        /// Operation id.
        id: String,
        /// New start (RFC 3339).
        #[arg(long)]
        start: Option<String>,
        /// New end (RFC 3339).
        #[arg(long)]
        end: Option<String>,
        /// New work center id.
        #[arg(long = "work-center")]
        work_center: Option<String>,
        #[arg(long)]
        board: Option<String>,
    },

    /// Follow a board's live channel until interrupted.
    Watch {
        #[arg(long)]
        board: Option<String>,
        /// Stop after this many seconds.
        #[arg(long = "for")]
        duration: Option<u64>,
    },

    /// Show version.
    Version,
}

#[derive(Subcommand, Debug)]
enum ContextAction {
    /// List all contexts.
    List,
    /// Create a context or set properties on it.
    Set {
        name: String,
        #[arg(long)]
        server: Option<String>,
        /// Live channel base URL when it differs from the server.
        #[arg(long = "ws-server")]
        ws_server: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        board: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Delete a context.
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum UseWhat {
    /// Switch to a context.
    Context { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(ClientConfig::default_path);
    let json_output = cli.output == "json";

    match cli.command {
        Commands::Context { action } => match action {
            ContextAction::List => {
                commands::context::list(&config_path)?;
            }
            ContextAction::Set {
                name,
                server,
                ws_server,
                tenant,
                board,
                token,
            } => {
                let props = commands::context::ContextProps {
                    server,
                    ws_server,
                    tenant,
                    board,
                    token,
                };
                commands::context::set(&name, props, &config_path)?;
            }
            ContextAction::Delete { name } => {
                commands::context::delete(&name, &config_path)?;
            }
        },

        Commands::Use { what } => match what {
            UseWhat::Context { name } => {
                commands::context::use_context(&name, &config_path)?;
            }
        },

        Commands::Login { user, password } => {
            let username = match user {
                Some(u) => u,
                None => {
                    eprint!("Username: ");
                    let mut s = String::new();
                    std::io::stdin().read_line(&mut s)?;
                    s.trim().to_string()
                }
            };
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            };
            if username.is_empty() || password.is_empty() {
                anyhow::bail!("Username and password are required.");
            }
            commands::login::login(&username, &password, &config_path).await?;
        }

        Commands::Logout => {
            commands::login::logout(&config_path)?;
        }

        Commands::Me => {
            commands::login::me(&config_path, cli.demo).await?;
        }

        Commands::Board { board } => {
            let sign_in = prompt_sign_in(cli.as_user)?;
            let backend = commands::Backend::open(&config_path, cli.demo, board.as_deref(), sign_in)?;
            commands::board::show(&backend, json_output).await?;
        }

        Commands::Move {
            id,
            start,
            end,
            work_center,
            board,
        } => {
            let sign_in = prompt_sign_in(cli.as_user)?;
            let backend = commands::Backend::open(&config_path, cli.demo, board.as_deref(), sign_in)?;
            let patch = commands::board::parse_patch(
                start.as_deref(),
                end.as_deref(),
                work_center.as_deref(),
            )?;
            commands::board::move_operation(&backend, &id, patch, json_output).await?;
        }

        Commands::Watch { board, duration } => {
            let sign_in = prompt_sign_in(cli.as_user)?;
            let backend = commands::Backend::open(&config_path, cli.demo, board.as_deref(), sign_in)?;
            let limit = duration.map(std::time::Duration::from_secs);
            commands::watch::watch(&backend, limit).await?;
        }

        Commands::Version => {
            println!("mfgsched v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn prompt_sign_in(user: Option<String>) -> anyhow::Result<Option<commands::SignIn>> {
    let Some(username) = user else {
        return Ok(None);
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    Ok(Some(commands::SignIn { username, password }))
}
