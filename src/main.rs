use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

mod cmd;
mod graph;
mod settings;
mod utils;

use cmd::format::{Role, box_header, color};
use cmd::{Dispatcher, StyleOptions};
use graph::{DeviceCodeInfo, DeviceCodePrompt, Session};
use settings::{Settings, SettingsOverrides};

/// Graph Console - interactive Microsoft Graph client (device code sign-in)
///
/// Settings are read from `appsettings.json` in the working directory (or
/// the file given with -c, JSON or YAML). Flags and environment override it.
///
/// Global flags / env:
///   -v / -vv              Increase verbosity (diagnostics go to stderr)
///   -q / --quiet          Errors only
///   -c / --config PATH    Settings file (or GRAPH_SETTINGS)
///   --client-id           App registration id (or GRAPH_CLIENT_ID)
///   --tenant-id           Tenant id or alias (or GRAPH_TENANT_ID)
///   --authority-host      Identity host (or GRAPH_AUTHORITY_HOST)
///   --scopes a,b,c        Delegated scopes (or GRAPH_SCOPES)
///
/// Examples:
///   graph-console
///   graph-console -c settings.yaml -v
///   GRAPH_CLIENT_ID=... graph-console --tenant-id organizations
#[derive(Parser, Debug)]
#[command(
    name = "graph-console",
    version,
    author,
    about = "Graph Console - interactive Microsoft Graph client"
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error diagnostics
    #[arg(short, long)]
    quiet: bool,

    /// Settings file (JSON or YAML)
    #[arg(short = 'c', long = "config", env = "GRAPH_SETTINGS", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Application (client) id
    #[arg(long, env = "GRAPH_CLIENT_ID")]
    client_id: Option<String>,

    /// Tenant id, or common / organizations / consumers
    #[arg(long, env = "GRAPH_TENANT_ID")]
    tenant_id: Option<String>,

    /// Identity platform host
    #[arg(long, env = "GRAPH_AUTHORITY_HOST", value_name = "URL")]
    authority_host: Option<String>,

    /// Delegated scopes, comma separated
    #[arg(long, env = "GRAPH_SCOPES", value_delimiter = ',')]
    scopes: Option<Vec<String>>,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            client_id: self.client_id.clone(),
            tenant_id: self.tenant_id.clone(),
            authority_host: self.authority_host.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    let style = StyleOptions::detect();
    println!(
        "{}\n",
        box_header("Graph Console", Some("device code sign-in"), &style)
    );

    let session = match start_session(&cli, &style) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Startup failed: {e:#}");
            std::process::exit(2);
        }
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    rt.block_on(async {
        let stdin = io::stdin();
        let mut dispatcher = Dispatcher::new(&session, stdin.lock(), io::stdout(), style);
        dispatcher.greet().await?;
        dispatcher.run().await
    })?;

    debug!("session closed");
    Ok(())
}

/// Load settings and move the session to Ready.
fn start_session(cli: &Cli, style: &StyleOptions) -> Result<Session> {
    let settings = Settings::load(cli.config.as_deref(), cli.overrides())?;
    info!(
        tenant = %settings.tenant_id,
        scopes = ?settings.graph_user_scopes,
        "settings loaded"
    );

    let prompt_style = style.clone();
    let prompt: DeviceCodePrompt = Arc::new(move |info: &DeviceCodeInfo| {
        // The user has to act on this line, so it goes to stdout even when quiet.
        println!("{}", color(Role::Success, &info.message, &prompt_style));
        let _ = io::stdout().flush();
    });

    let mut session = Session::new();
    session
        .initialize(settings, prompt)
        .context("initializing Graph for user auth")?;
    Ok(session)
}
