//! `escalate`: run SLA escalation over the complaint store
//!
//! # Usage
//!
//! ```bash
//! # One pass, notifications written to the log
//! escalate --store ./complaints.json
//!
//! # Preview only: nothing is written, nothing is sent
//! escalate --dry-run --warning-threshold 4
//!
//! # Every 15 minutes until Ctrl-C, delivering through a webhook
//! ESCALATE_WEBHOOK_URL=http://notify.local/send escalate --interval-secs 900
//! ```
//!
//! Exit status: 0 when the pass completes (or is cancelled), 1 for invalid
//! configuration, 2 when the complaint store cannot be reached.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use escalation_engine::dispatcher::NotificationGateway;
use escalation_engine::{
    ComplaintOutcome, Driver, EngineConfig, EscalationError, JsonFileStore, LogGateway,
    PassOptions, PassReport, SlaRegistry, SystemClock, WebhookGateway,
};

const EXIT_CONFIG: u8 = 1;
const EXIT_STORE_UNAVAILABLE: u8 = 2;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Evaluate and pick targets without writing anything or sending notifications
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Hours before the escalation deadline at which warnings start (overrides config)
    #[arg(long)]
    warning_threshold: Option<f64>,

    /// JSON snapshot holding complaints, officers, contacts and SLA configs
    #[arg(long, default_value = "complaints.json")]
    store: PathBuf,

    /// TOML engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deliver notifications by POSTing to this URL instead of logging them
    #[arg(long)]
    webhook_url: Option<String>,

    /// Complaints processed concurrently
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Stop starting new complaints after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Repeat the pass on this interval until interrupted
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Print the full pass report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    /// File, then `ESCALATE_*` environment, then flags.
    fn engine_config(&self) -> Result<EngineConfig> {
        let base = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        self.overlay(base.with_env_overrides()?)
    }

    fn overlay(&self, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(hours) = self.warning_threshold {
            config.warning_threshold_hours = hours;
        }
        if let Some(n) = self.max_parallel {
            config.max_parallel = n;
        }
        if let Some(url) = &self.webhook_url {
            config.notifications.webhook_url = Some(url.clone());
        }
        config.validated().context("invalid engine configuration")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match args.engine_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<EscalationError>() {
            Some(EscalationError::StoreUnavailable(_)) => {
                error!("{e:#}");
                ExitCode::from(EXIT_STORE_UNAVAILABLE)
            }
            _ => {
                error!("{e:#}");
                ExitCode::from(EXIT_CONFIG)
            }
        },
    }
}

async fn run(args: &Args, config: EngineConfig) -> Result<()> {
    let store = Arc::new(
        JsonFileStore::open(&args.store)
            .await
            .map_err(EscalationError::from)
            .with_context(|| format!("opening complaint store {}", args.store.display()))?,
    );
    let registry = SlaRegistry::from_configs(
        store
            .sla_configs()
            .await
            .map_err(EscalationError::from)
            .context("reading SLA configuration")?,
    );
    if registry.is_empty() {
        warn!("No SLA policies configured; every complaint will be skipped");
    }

    let gateway: Arc<dyn NotificationGateway> = match &config.notifications.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering notifications via webhook");
            Arc::new(WebhookGateway::new(url.clone()))
        }
        None => Arc::new(LogGateway),
    };

    info!(
        store = %args.store.display(),
        policies = registry.len(),
        dry_run = args.dry_run,
        "Escalation engine starting"
    );
    let driver = Driver::new(
        store.clone(),
        store,
        registry,
        gateway,
        Arc::new(SystemClock),
        config,
    );

    let cancel = CancellationToken::new();
    spawn_cancel_on_signal(cancel.clone(), args.deadline_secs.map(Duration::from_secs));

    let options = PassOptions {
        dry_run: args.dry_run,
        // Already folded into the config
        warning_threshold_hours: None,
    };

    if let Some(secs) = args.interval_secs {
        driver
            .run_periodic(Duration::from_secs(secs.max(1)), &options, &cancel)
            .await;
        return Ok(());
    }

    let report = driver
        .run_pass(&options, &cancel)
        .await
        .context("escalation pass aborted")?;
    print_report(&report, args.json)
}

/// Cancel on Ctrl-C or once `deadline` elapses, whichever is first.
fn spawn_cancel_on_signal(cancel: CancellationToken, deadline: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Could not listen for Ctrl-C");
                    return;
                }
                info!("Interrupted; finishing in-flight complaints");
            }
            _ = deadline => info!("Deadline reached; finishing in-flight complaints"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn print_report(report: &PassReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("serializing pass report")?
        );
        return Ok(());
    }
    for entry in report.pending_escalations() {
        let elapsed = entry.elapsed_hours.unwrap_or_default();
        match &entry.outcome {
            ComplaintOutcome::WouldEscalate { target_officer } => println!(
                "[DRY RUN] Would escalate complaint #{} ({elapsed:.1}h elapsed) to officer #{target_officer}",
                entry.complaint_id
            ),
            ComplaintOutcome::Escalated { target_officer, escalation_id } => println!(
                "Escalated complaint #{} ({elapsed:.1}h elapsed) to officer #{target_officer} [{escalation_id}]",
                entry.complaint_id
            ),
            _ => {}
        }
    }
    println!("{}", report.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "escalate",
            "--dry-run",
            "--warning-threshold",
            "4",
            "--max-parallel",
            "2",
            "--webhook-url",
            "http://localhost:9000/notify",
        ])
        .unwrap();
        assert!(args.dry_run);

        let config = args.overlay(EngineConfig::default()).unwrap();
        assert_eq!(config.warning_threshold_hours, 4.0);
        assert_eq!(config.max_parallel, 2);
        assert_eq!(
            config.notifications.webhook_url.as_deref(),
            Some("http://localhost:9000/notify")
        );
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let args = Args::try_parse_from(["escalate", "--warning-threshold=-1"]).unwrap();
        assert!(args.overlay(EngineConfig::default()).is_err());
    }

    #[test]
    fn test_threshold_beyond_a_year_is_rejected() {
        let args = Args::try_parse_from(["escalate", "--warning-threshold", "1e10"]).unwrap();
        let err = args.overlay(EngineConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("warning_threshold_hours"), "{err:#}");
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escalate.toml");
        std::fs::write(
            &path,
            "warning_threshold_hours = 3.0\nmax_parallel = 16\n\n[notifications]\nmax_attempts = 5\n",
        )
        .unwrap();

        let args = Args::try_parse_from([
            "escalate",
            "--config",
            path.to_str().unwrap(),
            "--max-parallel",
            "4",
        ])
        .unwrap();
        let config = args
            .overlay(EngineConfig::from_file(&path).unwrap())
            .unwrap();
        assert_eq!(config.warning_threshold_hours, 3.0);
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.notifications.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_missing_store_maps_to_unavailable() {
        let args = Args::try_parse_from(["escalate", "--store", "/nonexistent/complaints.json"])
            .unwrap();
        let err = run(&args, EngineConfig::default()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EscalationError>(),
            Some(EscalationError::StoreUnavailable(_))
        ));
    }
}
