//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository/hasher traits, but AppState pins them
//! to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::delivery::DeliveryRouter;
use parley_core::service::account::AccountService;
use parley_core::session::SessionRegistry;
use parley_infra::config::load_global_config;
use parley_infra::crypto::credentials::Argon2CredentialHasher;
use parley_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use parley_infra::sqlite::account::SqliteAccountRepository;
use parley_infra::sqlite::message::SqliteMessageStore;
use parley_infra::sqlite::pool::{DatabasePool, database_url};
use parley_types::config::GlobalConfig;
use tokio_util::sync::CancellationToken;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteRouter = DeliveryRouter<SqliteMessageStore>;

pub type ConcreteAccountService = AccountService<SqliteAccountRepository, Argon2CredentialHasher>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST/WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GlobalConfig>,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<ConcreteRouter>,
    pub account_service: Arc<ConcreteAccountService>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    /// Cancelled on server shutdown; open WebSocket tasks watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state in the default data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::open(resolve_data_dir()).await
    }

    /// Connect to the database in `data_dir` and wire services.
    pub async fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir).await?;
        let config = load_global_config(&data_dir).await;

        let db_url = format!("{}?mode=rwc", database_url(&data_dir));
        let db_pool = DatabasePool::new(&db_url).await?;

        let registry = Arc::new(SessionRegistry::new(config.mailbox_capacity));
        let store = Arc::new(SqliteMessageStore::new(db_pool.clone()));
        let router = DeliveryRouter::new(store, Arc::clone(&registry), &config);

        let account_service = AccountService::new(
            Arc::new(SqliteAccountRepository::new(db_pool.clone())),
            Arc::new(Argon2CredentialHasher::new()),
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            router: Arc::new(router),
            account_service: Arc::new(account_service),
            data_dir,
            db_pool,
            shutdown: CancellationToken::new(),
        })
    }
}
