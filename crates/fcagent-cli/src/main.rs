//! fcagent CLI
//!
//! Drives a firecracker-containerd agent over ttrpc (vsock or TCP) and
//! relays the standard streams of processes it starts.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use fcagent_cli::call_cmd::{self, CallArgs};
use fcagent_cli::connection::AgentConnection;
use fcagent_cli::create_cmd::{self, CreateArgs};
use fcagent_cli::exec_cmd::{self, ExecArgs};
use fcagent_core::config::{Config, load_config};
use fcagent_core::transport::Endpoint;

#[derive(Parser, Debug)]
#[command(name = "fcagent")]
#[command(version, about = "Client for the firecracker-containerd in-VM agent")]
struct Cli {
    /// vsock context id of the VM
    #[arg(long, global = true, env = "FCAGENT_CID")]
    cid: Option<u32>,

    /// Agent port [default: 10789]
    #[arg(long, global = true, env = "FCAGENT_PORT")]
    port: Option<u32>,

    /// Reach the agent over TCP at host:port instead of vsock
    #[arg(long, global = true, env = "FCAGENT_ADDR")]
    addr: Option<String>,

    /// Config file (default ~/.config/fcagent/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, global = true, env = "FCAGENT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true, env = "FCAGENT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a ttrpc service method with a JSON request
    Call(CallArgs),
    /// Create a new container
    Create(CreateArgs),
    /// Execute a command in a container
    Exec(ExecArgs),
}

impl Cli {
    /// Command-line values win over the config file.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(cid) = self.cid {
            config.agent.cid = cid;
        }
        if let Some(port) = self.port {
            config.agent.port = port;
        }
        if let Some(addr) = &self.addr {
            config.agent.addr = Some(addr.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        config.log.json |= self.log_json;
    }
}

fn agent_endpoint(config: &Config) -> anyhow::Result<Endpoint> {
    Ok(match &config.agent.addr {
        Some(addr) => addr.parse()?,
        None => Endpoint::Vsock {
            cid: config.agent.cid,
            port: config.agent.port,
        },
    })
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let endpoint = agent_endpoint(&config)?;
    let conn = AgentConnection::connect(&endpoint).await?;
    match cli.command {
        Command::Call(args) => call_cmd::run(&conn, args).await,
        Command::Create(args) => create_cmd::run(&conn, args).await,
        Command::Exec(args) => exec_cmd::run(Arc::new(conn), &endpoint, &config.io, args).await,
    }
}

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut config);

    fcagent_core::tracing_init::init_tracing(
        &fcagent_core::tracing_init::default_filter(&config.log.level),
        config.log.json,
    );
    info!(version = env!("CARGO_PKG_VERSION"), "Starting fcagent");

    let result = run(cli, config).await;
    if let Err(ref e) = result {
        error!(error = %format!("{e:#}"), "Command failed");
    }

    // Exit without tearing down the runtime: a relay may still hold a
    // blocking read on stdin.
    std::process::exit(i32::from(result.is_err()))
}
