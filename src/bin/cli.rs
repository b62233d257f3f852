//! respwire CLI Client
//!
//! Sends one command to a server and prints the reply.

use std::process;
use std::time::Duration;

use clap::Parser;
use respwire::{Connection, ConnectionConfig, Endpoint, RespError};
use tracing_subscriber::{fmt, EnvFilter};

/// respwire CLI
#[derive(Parser, Debug)]
#[command(name = "respwire-cli")]
#[command(about = "Send a command to a Redis-compatible server")]
#[command(version)]
struct Args {
    /// Server hostname
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = respwire::network::DEFAULT_PORT)]
    port: u16,

    /// Unix socket path (overrides host and port)
    #[arg(short, long)]
    socket: Option<String>,

    /// Send/receive and connect timeout in milliseconds (0 disables)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Send the command this many times
    #[arg(short, long, default_value = "1")]
    repeat: usize,

    /// Command name followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> respwire::Result<()> {
    let endpoint = match &args.socket {
        Some(path) => Endpoint::unix(path),
        None => Endpoint::tcp(&args.host, args.port),
    };

    let mut builder = ConnectionConfig::builder();
    if args.timeout_ms > 0 {
        builder = builder
            .timeout_ms(args.timeout_ms)
            .connect_timeout(Duration::from_millis(args.timeout_ms));
    }

    let mut conn = Connection::with_config(builder.build());
    tracing::debug!("Connecting to {}", endpoint);
    conn.connect_endpoint(&endpoint, None)?;

    for _ in 0..args.repeat {
        conn.write(&args.command)?;
    }

    for _ in 0..args.repeat {
        match conn.read() {
            Ok(reply) => println!("{}", reply),
            // Error replies are answers, not failures of the CLI
            Err(RespError::ErrorReply(message)) => println!("(error) {}", message),
            Err(e) => return Err(e),
        }
    }

    conn.disconnect();
    Ok(())
}
