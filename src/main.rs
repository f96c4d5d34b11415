//! Intersection manager server.

use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use intersection_manager::{PolicyKind, Result, Server, ServerConfig};
use log::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "intersection-manager")]
#[command(about = "Grant autonomous vehicles access to an intersection")]
struct Args {
    /// UDP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Admission policy.
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the log to this file instead of stderr.
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Log debug messages.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Cannot open log file: {e}");
        return ExitCode::FAILURE;
    }

    match serve(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args) -> std::io::Result<()> {
    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &args.log {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn serve(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }

    Server::bind(&config)?.run()
}
