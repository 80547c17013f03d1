use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use sitescan_engine::{KidsSafetyScorer, SafeBrowsingClient, Scanner, StrategyFetcher};
use sitescan_server::api::{self, AppState, ScanResponse};
use sitescan_server::models::NewScan;
use sitescan_server::{Database, InMemoryVisitorStore, Settings};
use std::path::PathBuf;
use std::sync::Arc;

/// Command line arguments
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Subcommand to run
    #[clap(subcommand)]
    command: Command,

    /// Database file path
    #[clap(short, long, env = "SITESCAN_DB_PATH", default_value = "sitescan.db")]
    db_path: PathBuf,

    /// Log level
    #[clap(short, long, default_value = "info")]
    log_level: LevelFilter,

    /// Optional TOML settings file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Google Safe Browsing API key
    #[clap(long, env = "GOOGLE_SAFE_BROWSING_API_KEY", hide_env_values = true)]
    safe_browsing_key: Option<String>,

    /// Admin PIN for repeat ratings and bulk clears
    #[clap(long, env = "SITESCAN_ADMIN_PIN", hide_env_values = true)]
    admin_pin: Option<String>,

    /// Only use the direct HTTP fetch
    #[clap(long)]
    no_browser: bool,
}

/// Subcommands
#[derive(Subcommand)]
enum Command {
    /// Start the API server
    Server {
        /// Host to bind to (overrides the settings file)
        #[clap(long)]
        host: Option<String>,

        /// Port to bind to (overrides the settings file)
        #[clap(short, long)]
        port: Option<u16>,
    },

    /// Scan one site, store the result and print it as JSON
    Scan {
        /// Target URL or bare domain
        url: String,
    },

    /// Delete every stored scan and feedback entry
    Clear,
}

impl Args {
    /// Settings file values with CLI/env values layered on top
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(key) = &self.safe_browsing_key {
            settings.safe_browsing_key = Some(key.clone());
        }
        if let Some(pin) = &self.admin_pin {
            settings.admin_pin = Some(pin.clone());
        }
        if self.no_browser {
            settings.browser_enabled = false;
        }
        Ok(settings)
    }
}

fn build_scanner(settings: &Settings) -> Result<Scanner> {
    let fetcher = StrategyFetcher::standard(settings.browser_enabled)
        .context("Failed to initialize page fetcher")?;
    info!(
        "Page fetcher ready (browser strategy: {})",
        if fetcher.has_browser() { "on" } else { "off" }
    );

    let reputation = SafeBrowsingClient::new(settings.safe_browsing_key.clone());
    if !reputation.has_key() {
        info!("No Safe Browsing key configured, reputation checks are skipped");
    }

    Ok(Scanner::new(
        Arc::new(fetcher),
        KidsSafetyScorer::new(Arc::new(reputation)),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .init();

    let mut settings = args.settings().context("Failed to load settings")?;

    // Initialize database
    let db = Database::new(&args.db_path).context("Failed to initialize database")?;
    db.init_tables().context("Failed to create database tables")?;

    match args.command {
        Command::Server { host, port } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }

            let scanner = build_scanner(&settings)?;
            let visitors = Arc::new(InMemoryVisitorStore::new(
                settings.captcha_ttl(),
                settings.visitor_idle(),
                settings.admin_pin.clone(),
            ));
            let addr = settings.bind_addr();
            let state = Arc::new(AppState::new(db, scanner, visitors, settings));

            api::start_api_server(state, &addr)
                .await
                .context("Failed to start API server")?;
        }
        Command::Scan { url } => {
            let scanner = build_scanner(&settings)?;
            let report = scanner.scan(&url).await?;
            let record = db.insert_scan(&NewScan::from_report(&report))?;
            info!("Stored scan #{} for {}", record.id, record.domain);

            let response = ScanResponse {
                id: record.id,
                report,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Clear => {
            let cleared = db.clear_all()?;
            println!(
                "Removed {} scans and {} feedback entries",
                cleared.scans, cleared.feedback
            );
        }
    }

    Ok(())
}
