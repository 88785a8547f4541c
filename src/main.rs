// Main entry point for Sentinel Trust

use anyhow::Context;
use chrono::Utc;
use sentinel_trust::audit::AuditPipeline;
use sentinel_trust::auth::blacklist::{Blacklist, MemoryBlacklist};
use sentinel_trust::auth::key_registry::{KeyRegistry, SigningKeyPair};
use sentinel_trust::auth::token_service::TokenService;
use sentinel_trust::config::Config;
use sentinel_trust::core::models::{EventRecord, Severity};
use sentinel_trust::engine::risk_tracker::RiskTracker;
use sentinel_trust::engine::rule_engine::RuleEngine;
use sentinel_trust::engine::threat_detector::ThreatDetector;
use sentinel_trust::loader::rule_loader::RuleLoader;
use sentinel_trust::state::memory_store::{MemoryAlertSink, MemoryAuditStore};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load and validate configuration first (before any logging)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Tracing can only be initialized once
    init_tracing(&config)?;

    info!("Starting Sentinel Trust");
    info!(
        issuer = %config.token_issuer,
        audience = %config.token_audience,
        access_ttl_secs = config.access_token_ttl_secs,
        refresh_ttl_secs = config.refresh_token_ttl_secs,
        "Configuration loaded"
    );

    // 3. Signing keys
    let key_registry = Arc::new(match config.signing_key_path {
        Some(ref path) => {
            let key = SigningKeyPair::from_pem_file(path, Utc::now())
                .with_context(|| format!("Failed to load signing key from {:?}", path))?;
            KeyRegistry::with_initial_key(key, config.key_rotation_interval())
        }
        None => {
            warn!("SIGNING_KEY_PATH not set, generating an ephemeral signing key");
            KeyRegistry::new(config.key_rotation_interval()).context("Failed to generate signing key")?
        }
    });

    // 4. Token service
    let blacklist = Arc::new(MemoryBlacklist::new(config.blacklist_max_capacity));
    let token_service = Arc::new(
        TokenService::new(key_registry.clone(), blacklist.clone(), config.token_config())
            .context("Failed to initialize token service")?,
    );

    // 5. Security rules
    let rules = match config.security_rules_yaml_path {
        Some(ref path) => RuleLoader::from_file(path)
            .with_context(|| format!("Failed to load security rules from {:?}", path))?,
        None => {
            info!("SECURITY_RULES_YAML_PATH not set, using default security rules");
            RuleLoader::with_defaults()
        }
    };
    info!(rule_count = rules.rules().len(), "Security rules loaded");

    // 6. Audit pipeline
    let audit_store = Arc::new(MemoryAuditStore::with_max_events(config.audit_store_max_events));
    let alert_sink = Arc::new(MemoryAlertSink::new());
    let risk_tracker = Arc::new(RiskTracker::new());
    let detector = Arc::new(ThreatDetector::new(risk_tracker.clone(), alert_sink.clone()));
    let rule_engine = Arc::new(RuleEngine::new(
        audit_store.clone(),
        alert_sink.clone(),
        rules.into_rules(),
    ));
    let pipeline = AuditPipeline::start(config.pipeline_config(), audit_store, detector, rule_engine)
        .context("Failed to start audit pipeline")?;

    pipeline.submit(
        EventRecord::new("SYSTEM", Severity::Info)
            .action("startup")
            .result("SUCCESS")
            .detail("issuer", token_service.config().issuer.clone()),
    );

    // 7. Maintenance: key rotation and blacklist cleanup
    let (maintenance_stop, mut maintenance_stop_rx) = watch::channel(false);
    let maintenance = {
        let key_registry = key_registry.clone();
        let blacklist = blacklist.clone();
        let interval = config.maintenance_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = maintenance_stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = key_registry.rotate(Utc::now()) {
                            error!(error = %e, "Scheduled key rotation failed");
                        }
                        if let Err(e) = blacklist.cleanup().await {
                            warn!(error = %e, "Blacklist cleanup failed");
                        }
                    }
                }
            }
        })
    };

    info!(
        active_kid = %key_registry.active_key()?.key_id(),
        maintenance_interval_secs = config.maintenance_interval_secs,
        "Sentinel Trust ready"
    );

    // 8. Run until shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping");
    let _ = maintenance_stop.send(true);
    if let Err(e) = maintenance.await {
        warn!(error = %e, "Maintenance task ended abnormally");
    }
    pipeline.stop().await;

    let stats = pipeline.stats();
    info!(
        submitted = stats.submitted,
        dropped = stats.dropped,
        processed = stats.processed,
        storage_failures = stats.storage_failures,
        alerts_raised = stats.alerts_raised,
        top_risky_ips = ?risk_tracker.top_risky_ips(5)?,
        "Sentinel Trust stopped"
    );

    Ok(())
}

/// Initialize tracing subscriber with JSON or text formatting
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
