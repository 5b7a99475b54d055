//! kvscout - dump the keyspace of database 0
//!
//! Probes the server, scans database 0 with expiry and idle metadata, and
//! prints every key followed by its contents.

use anyhow::Context;
use kvscout::{Configuration, Endpoint, Error, Instance, ScanOptions};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Keys printed at most.
const MAX_ITEMS: usize = 20_000;

/// Command-line arguments
struct Args {
    server: String,
    port: u16,
    password: Option<String>,
}

impl Args {
    /// Parses `[server] [port] [password]`.
    fn from_env() -> anyhow::Result<Self> {
        let mut args = Self {
            server: kvscout::DEFAULT_HOST.to_string(),
            port: kvscout::DEFAULT_PORT,
            password: None,
        };

        let positional: Vec<String> = std::env::args().skip(1).collect();
        if let Some(first) = positional.first() {
            match first.as_str() {
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("kvscout version {}", kvscout::VERSION);
                    std::process::exit(0);
                }
                _ => {}
            }
        }
        if positional.len() > 3 {
            print_help();
            anyhow::bail!("expected at most 3 arguments, got {}", positional.len());
        }

        let mut positional = positional.into_iter();
        if let Some(server) = positional.next() {
            args.server = server;
        }
        if let Some(port) = positional.next() {
            args.port = port
                .parse()
                .with_context(|| format!("invalid port '{}'", port))?;
        }
        args.password = positional.next().filter(|p| !p.is_empty());

        Ok(args)
    }

    fn configuration(&self) -> kvscout::Result<Configuration> {
        let config = Configuration::new(vec![Endpoint::new(self.server.clone(), self.port)])?;
        Ok(match &self.password {
            Some(password) => config.with_password(password.clone()),
            None => config,
        })
    }
}

fn print_help() {
    println!(
        r#"
kvscout - probe a Redis-compatible server and dump database 0

USAGE:
    kvscout [SERVER] [PORT] [PASSWORD]

ARGS:
    SERVER      Host to connect to (default: localhost)
    PORT        Port to connect to (default: 6379)
    PASSWORD    Password sent with AUTH (default: none)

ENVIRONMENT:
    RUST_LOG    Log filter, e.g. RUST_LOG=kvscout=debug (default: info)
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::from_env()?;

    // Logs go to stderr so the dump on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let instance = Instance::from_config(args.configuration()?);
    let probe = instance
        .probe()
        .await
        .with_context(|| format!("could not probe {}:{}", args.server, args.port))?;
    info!(
        version = probe.version().unwrap_or("unknown"),
        max_database = probe.max_database(),
        "Connected"
    );

    let options = ScanOptions::new()
        .max_count(MAX_ITEMS)
        .include_expiry(true)
        .include_last_accessed(true);
    let keys = instance
        .scan_database(0, &options)
        .await
        .context("scan of database 0 failed")?;
    let db = instance.database(0).await?;

    for descriptor in keys.values() {
        println!("{}", descriptor);
        match descriptor.read_contents(&db).await {
            Ok(contents) => println!("{}", contents),
            Err(Error::UnsupportedType { key_type, .. }) => {
                println!("Unsupported type '{}'.", key_type);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("could not read '{}'", descriptor.name()));
            }
        }
    }

    debug!(keys = keys.len(), "Dump complete");
    println!("Item count = {}", keys.len());
    Ok(())
}
