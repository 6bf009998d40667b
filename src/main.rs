//! AMPACT Selector launcher
//!
//! On every launch, before anything else initializes:
//! 1. Run the authorization gate
//! 2. Allowed: hand over to application startup
//! 3. Denied: tear down the offline copy, show the lockout screen, and
//!    re-run the gate each time the user asks to check again

use ampact_gate::lockout::{OfflineCacheDir, TerminalSurface};
use ampact_gate::{
    DecisionSource, FileStore, Gate, GateConfig, HostSignals, LockoutPresenter, MessageConfig,
    PolicyStoreClient,
};
use log::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the lockout screen
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ureq=warn,rustls=warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("AMPACT gate v{} starting", env!("CARGO_PKG_VERSION"));

    let config = GateConfig::from_env();
    if config.bearer_token.is_empty() {
        warn!("No policy credential configured, the policy table will reject requests");
    }
    info!("Policy endpoint: {}", config.policy_endpoint);
    info!("Data directory: {}", config.data_dir.display());

    let gate = Gate::new(
        PolicyStoreClient::new(&config),
        FileStore::in_dir(&config.data_dir),
        HostSignals::new(),
    );
    let mut presenter = LockoutPresenter::new(
        OfflineCacheDir::in_dir(&config.data_dir),
        TerminalSurface::stdio(),
    );

    loop {
        let context = gate.check();
        if context.decision.allowed {
            info!(
                "AMPACT Selector initialized ({} decision)",
                context.decision.source
            );
            return Ok(());
        }

        let message = match context.decision.source {
            DecisionSource::Cache => MessageConfig::restricted(&config.contact_email),
            DecisionSource::Live | DecisionSource::FailOpen => {
                MessageConfig::revoked(&config.contact_email)
            }
        };
        presenter.present(&context.device_id, &message);

        if !presenter.await_retry() {
            info!("Access denied, exiting");
            return Ok(());
        }
        info!("Checking access again");
    }
}
