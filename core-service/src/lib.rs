//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage) and the environment configuration into the playlist sync
//! engine. Desktop apps typically enable the `desktop-shims` feature (which
//! depends on `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::SyncService;

use std::sync::Arc;

use bridge_traits::{http::HttpClient, storage::SecureStore};
use core_auth::CredentialManager;
use core_matching::{LlmSongNormalizer, SongNormalizer};
use core_runtime::config::AppConfig;
use core_sync::db::{create_pool, DatabaseConfig};
use core_sync::{ProviderRegistry, SqliteSyncConfigRepository, SqliteSyncRunRepository};
use provider_spotify::SpotifyConnector;
use provider_tidal::TidalConnector;
use provider_youtube::YouTubeConnector;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(http_client: Arc<dyn HttpClient>, secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            http_client,
            secure_store,
        }
    }
}

/// Builds a ready-to-use service from `config` and the host bridges.
///
/// Opens (and migrates) the database, registers every provider connector
/// and enables the metadata normalizer when `config` asks for it.
///
/// # Errors
///
/// Returns an error if `config` is invalid or the database cannot be opened
pub async fn bootstrap(config: &AppConfig, deps: CoreDependencies) -> Result<SyncService> {
    config.validate()?;

    let pool = create_pool(DatabaseConfig::from_settings(&config.database)).await?;

    let credentials = Arc::new(CredentialManager::from_config(
        deps.secure_store,
        deps.http_client.clone(),
        config,
    ));

    let providers = Arc::new(ProviderRegistry::new());
    providers
        .register(Arc::new(SpotifyConnector::new(
            deps.http_client.clone(),
            credentials.clone(),
        )))
        .await;
    providers
        .register(Arc::new(YouTubeConnector::new(
            deps.http_client.clone(),
            credentials.clone(),
        )))
        .await;
    providers
        .register(Arc::new(TidalConnector::new(
            deps.http_client.clone(),
            credentials.clone(),
        )))
        .await;

    let normalizer = LlmSongNormalizer::from_settings(deps.http_client, &config.llm)
        .map(|n| Arc::new(n) as Arc<dyn SongNormalizer>);
    info!(
        normalizer = normalizer.is_some(),
        "Sync service dependencies ready"
    );

    Ok(SyncService::from_parts(
        credentials,
        providers,
        Arc::new(SqliteSyncConfigRepository::new(pool.clone())),
        Arc::new(SqliteSyncRunRepository::new(pool)),
        &config.sync,
        normalizer,
    ))
}

/// Convenience bootstrapper for desktop hosts: `reqwest` for HTTP and the
/// OS keychain for tokens.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::AppConfig;
///
/// let config = AppConfig::from_env()?;
/// let service = core_service::bootstrap_desktop(&config).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: &AppConfig) -> Result<SyncService> {
    use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient};

    let http_client = ReqwestHttpClient::new()?;
    let deps = CoreDependencies::new(
        Arc::new(http_client),
        Arc::new(KeyringSecureStore::new()),
    );
    bootstrap(config, deps).await
}
