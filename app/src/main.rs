use std::error::Error;
use std::sync::Arc;

use kozani_adapters::{GithubDeviceFlow, KeyringCredentialStore, SqlMetadataSource};
use kozani_core::auth::{CredentialStore, FileCredentialStore};
use kozani_core::config::{AppConfig, CredentialSource};
use kozani_core::connections::FileConnectionStore;
use kozani_core::diagnostics::{init_diagnostics, DiagnosticsConfig};
use kozani_tui::{Services, TuiError};

fn build_services(config: &AppConfig) -> Result<Services, Box<dyn Error>> {
    let credentials: Arc<dyn CredentialStore> = match config.credential_source {
        CredentialSource::File => Arc::new(FileCredentialStore::new(config.credentials_path())),
        CredentialSource::Keyring => Arc::new(KeyringCredentialStore::default()),
    };
    let device_flow =
        GithubDeviceFlow::new(config.github_client_id.clone(), Arc::clone(&credentials))?;

    Ok(Services {
        connections: Arc::new(FileConnectionStore::new(config.connections_path())),
        credentials,
        device_flow: Arc::new(device_flow),
        metadata: Arc::new(SqlMetadataSource::new()),
    })
}

fn run_app(
    config: &AppConfig,
    run_tui: impl FnOnce(Services) -> Result<(), TuiError>,
) -> Result<(), Box<dyn Error>> {
    init_diagnostics(&DiagnosticsConfig {
        log_file: config.log_file.clone(),
        filter: config.log_filter.clone(),
    })?;
    tracing::info!(
        config_dir = %config.config_dir.display(),
        credential_source = ?config.credential_source,
        "starting kozani"
    );

    let services = build_services(config)?;
    run_tui(services)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load_default()?;
    run_app(&config, kozani_tui::run)
}
