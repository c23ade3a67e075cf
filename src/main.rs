//! CLI entry point for `mailcast`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use mailcast::config::{self, Config, TransportKind};
use mailcast::dispatch::{self, Pacing, Progress};
use mailcast::transport::outbox::Outbox;
use mailcast::transport::provider::oauth::{self, Authorizer, ClientSecret, GMAIL_SEND_SCOPE};
use mailcast::transport::provider::token::Token;
use mailcast::transport::provider::ProviderTransport;
use mailcast::transport::relay::RelayTransport;
use mailcast::transport::Transport;

#[derive(Parser)]
#[command(name = "mailcast", version, about)]
struct Cli {
    /// Files to attach to every message
    #[arg(long, num_args = 0.., value_name = "FILE")]
    attach: Vec<PathBuf>,

    /// Configuration file (TOML, or legacy positional settings.txt)
    #[arg(short, long, env = "MAILCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write messages as .eml files into DIR instead of sending them
    #[arg(long, value_name = "DIR")]
    outbox: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Asks the user to open the consent page and paste back the code.
struct ConsoleAuthorizer;

impl Authorizer for ConsoleAuthorizer {
    fn obtain_credential(
        &self,
        client: &reqwest::blocking::Client,
        secret: &ClientSecret,
    ) -> mailcast::error::Result<Token> {
        let url = oauth::authorization_url(secret, GMAIL_SEND_SCOPE)?;
        eprintln!();
        eprintln!("  Open this URL in a browser and grant access:");
        eprintln!();
        eprintln!("  {url}");
        eprintln!();
        eprint!("  Authorization code: ");
        let _ = std::io::stderr().flush();

        let mut code = String::new();
        std::io::stdin()
            .read_line(&mut code)
            .map_err(|e| mailcast::error::Error::io("<stdin>", e))?;
        oauth::exchange_code(client, secret, &code)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = config::config_file_path(cli.config.as_deref()).context(
        "No configuration found: pass --config, set MAILCAST_CONFIG, or create ./mailcast.toml",
    )?;
    let config = config::load_config(&path)?;

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let campaign = dispatch::prepare(&config, &cli.attach)?;
    let (mut transport, pacing) = build_transport(&config, cli.outbox.as_ref())?;

    let planned = campaign.planned(&pacing);
    let pb = ProgressBar::new(planned as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Sending [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = campaign.run(
        transport.as_mut(),
        pacing,
        &mut |pause| std::thread::sleep(pause),
        &|p: Progress<'_>| {
            pb.set_length(p.planned as u64);
            pb.set_position(p.sent as u64);
            pb.suspend(|| println!("  [{}/{}] {}  {}", p.sent, p.planned, p.recipient, p.delivery));
        },
    )?;
    pb.finish_and_clear();

    println!();
    match &cli.outbox {
        Some(dir) => println!("  Wrote {} message(s) to {}", report.sent(), dir.display()),
        None => println!("  SUCCESS: {} message(s) sent", report.sent()),
    }
    if report.limit_reached {
        println!(
            "  Limit of {} messages per run reached; remaining recipients were skipped",
            pacing.limit
        );
    }
    println!("  {:<10} {:.2?}", "Elapsed", start.elapsed());
    println!();

    Ok(())
}

/// Pick the transport for this run. The outbox wins over the configured server.
fn build_transport(
    config: &Config,
    outbox: Option<&PathBuf>,
) -> anyhow::Result<(Box<dyn Transport>, Pacing)> {
    if let Some(dir) = outbox {
        let outbox = Outbox::open(dir)
            .with_context(|| format!("Cannot use outbox directory {}", dir.display()))?;
        return Ok((Box::new(outbox), Pacing::unpaced()));
    }

    match config.transport_kind() {
        TransportKind::Provider => {
            let mut provider = ProviderTransport::new(
                config.provider_settings(),
                config.message.sender.clone(),
                Box::new(ConsoleAuthorizer),
            )?;
            // Resolve the token up front so an auth failure sends nothing.
            provider.ensure_token().context("Provider authorization failed")?;
            Ok((Box::new(provider), Pacing::default()))
        }
        TransportKind::Relay => Ok((
            Box::new(RelayTransport::new(config.relay_settings())),
            Pacing::default(),
        )),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::cache_dir(&config.logging);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailcast.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}
