use clap::{Parser, ValueEnum};
use consentpay::application::orchestrator::{ConsentOrchestrator, ResumeOutcome, StartOutcome};
use consentpay::config::{GatewayConfig, PollConfig};
use consentpay::domain::flow::FlowKind;
use consentpay::domain::payment::{Amount, PaymentRequest, Pcr};
use consentpay::domain::ports::GatewayRef;
use consentpay::infrastructure::http::HttpGateway;
use consentpay::infrastructure::in_memory::InMemoryGateway;
use consentpay::interfaces::console::ConsoleLauncher;
use consentpay::interfaces::deep_link::parse_return_url;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Single,
    Enduring,
}

impl From<KindArg> for FlowKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Single => FlowKind::Single,
            KindArg::Enduring => FlowKind::Enduring,
        }
    }
}

/// Runs one redirect-based payment: creates a consent, prints the
/// authorisation link, then reads return URLs from stdin.
///
/// Gateway credentials come from CONSENTPAY_CLIENT_ID and
/// CONSENTPAY_CLIENT_SECRET unless --simulate is given. An empty input
/// line re-checks the pending consent without a return URL.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payment amount in NZD
    #[arg(long)]
    amount: Decimal,

    #[arg(long, value_enum, default_value = "single")]
    kind: KindArg,

    /// Upper bound per payment and period for enduring consents
    #[arg(long)]
    maximum_amount: Option<Decimal>,

    #[arg(long, default_value = "")]
    particulars: String,

    #[arg(long, default_value = "")]
    code: String,

    #[arg(long, default_value = "")]
    reference: String,

    /// Use an in-process gateway that authorises every consent
    #[arg(long)]
    simulate: bool,

    #[arg(long, default_value_t = 10)]
    poll_attempts: u32,

    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut request = PaymentRequest::new(
        Amount::new(cli.amount).into_diagnostic()?,
        Pcr::new(cli.particulars, cli.code, cli.reference),
    );
    if let Some(maximum) = cli.maximum_amount {
        request = request.with_maximum_amount(Amount::new(maximum).into_diagnostic()?);
    }

    let gateway: GatewayRef = if cli.simulate {
        Arc::new(InMemoryGateway::new().with_auto_authorise())
    } else {
        let config = GatewayConfig::from_env().into_diagnostic()?;
        Arc::new(HttpGateway::new(config).into_diagnostic()?)
    };

    let orchestrator = ConsentOrchestrator::new(
        gateway,
        Arc::new(ConsoleLauncher::new(std::io::stdout())),
        PollConfig::new(cli.poll_attempts, Duration::from_millis(cli.poll_interval_ms)),
    );

    match orchestrator.start(cli.kind.into(), request).await {
        StartOutcome::Launched => {}
        _ => return Err(flow_failure(&orchestrator).await),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.into_diagnostic()? {
        let line = line.trim();
        let outcome = if line.is_empty() {
            orchestrator.resume_foreground().await
        } else {
            match parse_return_url(line) {
                Ok(signal) => orchestrator.resume(signal).await,
                Err(e) => {
                    eprintln!("{e}");
                    continue;
                }
            }
        };

        match outcome {
            ResumeOutcome::Completed { payment_id } => {
                println!("Payment completed ({payment_id})");
                return Ok(());
            }
            ResumeOutcome::Failed { message } => return Err(miette!("{message}")),
            ResumeOutcome::Discarded => {
                return Err(miette!("return URL did not match the pending payment"));
            }
            ResumeOutcome::Ignored | ResumeOutcome::Superseded => {}
        }
    }

    Err(miette!("input closed before the payment was authorised"))
}

async fn flow_failure(orchestrator: &ConsentOrchestrator) -> miette::Report {
    let snapshot = orchestrator.snapshot().await;
    miette!(
        "{}",
        snapshot
            .error
            .unwrap_or_else(|| "payment could not be started".to_string())
    )
}
