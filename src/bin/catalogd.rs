use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::warn;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use volstream::config::load_config;
use volstream::daemon::Daemon;

pub const DEFAULT_LOG_FILTER: &str = "info,volstream=info";
const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug, Clone)]
#[command(name = "volstream-catalogd", about = "Catalog daemon for backup storage sessions")]
struct Cli {
    /// Path to daemon configuration YAML
    #[arg(long)]
    config: PathBuf,

    /// env_logger-style filter string (e.g. "info,volstream::net=debug"); overrides the config file and RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_logging(filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = filter {
        builder.parse_filters(filter);
    }
    builder.format_timestamp_secs();
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(cli.log_filter.as_deref().or(config.log_filter.as_deref()));

    let daemon = Daemon::bootstrap(&config).context("bootstrapping catalog")?;
    let _server = daemon
        .serve(&config)
        .context("starting catalog listener")?;

    let interval = config
        .snapshot_interval()?
        .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL);
    loop {
        thread::sleep(interval);
        if let Err(err) = daemon.save_snapshot() {
            warn!("event=catalog_snapshot_failed error={err}");
        }
    }
}
