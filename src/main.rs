use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tillpay::application::coordinator::{Collaborators, PaymentCoordinator};
use tillpay::config::{CoordinatorConfig, ReconciliationStrategy};
use tillpay::domain::ports::{TransactionLedgerRef, UiEvent};
use tillpay::domain::tipping::TippingPolicy;
use tillpay::infrastructure::broadcast::BroadcastNotifier;
use tillpay::infrastructure::csv_ledger::CsvLedger;
use tillpay::infrastructure::in_memory::{InMemoryCart, InMemoryLedger};
use tillpay::infrastructure::signature::StripeSignatureVerifier;
use tillpay::infrastructure::stripe::{DEFAULT_BASE_URL, StripeClient};
use tillpay::interfaces::console::command_reader::CommandReader;
use tillpay::interfaces::console::response_writer::{Response, ResponseWriter};
use tillpay::interfaces::console::session::ConsoleSession;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Processor secret API key
    #[arg(long, env = "PROCESSOR_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Processor API base URL
    #[arg(long, env = "PROCESSOR_API_BASE", default_value = DEFAULT_BASE_URL)]
    api_base: String,

    /// Webhook signing secret
    #[arg(long, env = "PROCESSOR_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Public webhook URL. Enables webhook reconciliation.
    #[arg(long, env = "PROCESSOR_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// CSV ledger path. Without it entries are kept in memory.
    #[arg(long)]
    ledger: Option<PathBuf>,

    #[arg(long, default_value = "usd")]
    currency: String,

    /// Terminal location id, consulted for tipping overrides
    #[arg(long)]
    location: Option<String>,

    /// Flat tax rate applied by the cart, e.g. 0.0825
    #[arg(long, default_value = "0")]
    tax_rate: Decimal,

    /// Offer on-reader tipping
    #[arg(long, overrides_with = "no_tipping")]
    tipping: bool,

    #[arg(long, overrides_with = "tipping")]
    no_tipping: bool,

    #[arg(long)]
    tip_min: Option<Decimal>,

    #[arg(long)]
    tip_max: Option<Decimal>,

    /// Category eligible for tipping (repeatable)
    #[arg(long = "tip-category")]
    tip_categories: Vec<String>,

    /// Per-location tipping override as `<location>=<true|false>` (repeatable)
    #[arg(long = "tip-location", value_parser = parse_location_override)]
    tip_locations: Vec<(String, bool)>,
}

fn parse_location_override(raw: &str) -> std::result::Result<(String, bool), String> {
    let (location, enabled) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <location>=<true|false>, got `{raw}`"))?;
    let enabled = enabled
        .parse()
        .map_err(|_| format!("`{enabled}` is not true or false"))?;
    Ok((location.to_string(), enabled))
}

impl Cli {
    fn tipping(&self) -> TippingPolicy {
        TippingPolicy {
            enabled: self.tipping && !self.no_tipping,
            location_overrides: self.tip_locations.iter().cloned().collect::<HashMap<_, _>>(),
            min_amount: self.tip_min.unwrap_or_default(),
            max_amount: self.tip_max.unwrap_or_default(),
            allowed_categories: self.tip_categories.iter().cloned().collect(),
        }
    }

    fn config(&self) -> CoordinatorConfig {
        let strategy = if self.webhook_url.is_some() {
            ReconciliationStrategy::Webhook
        } else {
            ReconciliationStrategy::Polling
        };
        CoordinatorConfig {
            webhook_url: self.webhook_url.clone(),
            currency: self.currency.to_lowercase(),
            location: self.location.clone(),
            ..CoordinatorConfig::default()
        }
        .with_strategy(strategy)
        .with_tipping(self.tipping())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tillpay=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    if cli.webhook_url.is_some() && cli.webhook_secret.is_none() {
        miette::bail!("--webhook-secret is required when --webhook-url is set");
    }
    // Without a configured secret no delivery can carry a valid signature.
    let webhook_secret = SecretString::from(
        cli.webhook_secret
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );
    let verifier = StripeSignatureVerifier::new(&webhook_secret, config.signature_tolerance)
        .into_diagnostic()?;
    let processor = StripeClient::new(SecretString::from(cli.api_key.clone()), cli.api_base.clone())
        .into_diagnostic()?;

    let ledger: TransactionLedgerRef = match &cli.ledger {
        Some(path) => Arc::new(CsvLedger::new(path.clone())),
        None => {
            warn!("No --ledger path given, ledger entries are kept in memory only");
            Arc::new(InMemoryLedger::new())
        }
    };
    let cart = InMemoryCart::new(cli.tax_rate);
    let notifier = BroadcastNotifier::default();
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UiEvent::Progress { payment_id, progress }) => {
                    debug!(
                        payment_id = %payment_id,
                        seconds_remaining = progress.seconds_remaining,
                        "Progress"
                    );
                }
                Ok(UiEvent::Outcome(outcome)) => {
                    info!(payment_id = %outcome.payment_id, message = %outcome.message, "Outcome");
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "UI event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let coordinator = Arc::new(PaymentCoordinator::new(
        config,
        Collaborators {
            processor: Arc::new(processor),
            verifier: Arc::new(verifier),
            cart: Arc::new(cart.clone()),
            ledger,
            notifier: Arc::new(notifier),
        },
    ));
    coordinator.start().await;

    let session = ConsoleSession::new(coordinator.clone(), cart);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut writer = ResponseWriter::new(stdout.lock());
    for command in CommandReader::new(stdin.lock()).commands() {
        let response = match command {
            Ok(command) => session.execute(command).await,
            Err(e) => Response::from(e),
        };
        writer.write(&response).into_diagnostic()?;
    }

    coordinator.shutdown().await;
    Ok(())
}
