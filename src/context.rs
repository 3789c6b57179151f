/// Application context, the dependency injection container for all
/// server state
use crate::{
    binding::{BindingCodeIssuer, BindingManager, DeviceRegistry, TokenAuthority},
    checkin::CheckinGateway,
    config::ServerConfig,
    db::{self, DatabaseOptions},
    directory::{EmployeeDirectory, PointDirectory},
    error::PatrolResult,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub code_issuer: BindingCodeIssuer,
    pub device_registry: DeviceRegistry,
    pub binding_manager: BindingManager,
    pub token_authority: TokenAuthority,
    pub point_directory: PointDirectory,
    pub employee_directory: EmployeeDirectory,
    pub checkin_gateway: CheckinGateway,
}

impl AppContext {
    /// Create a new application context: validates config, opens the
    /// database, runs migrations, and wires up the managers.
    pub async fn new(config: ServerConfig) -> PatrolResult<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        let db = db::create_pool(&config.storage.database, DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let config = Arc::new(config);

        let code_issuer = BindingCodeIssuer::new(db.clone());
        let token_authority = TokenAuthority::new(db.clone());
        let device_registry = DeviceRegistry::new(db.clone());
        let binding_manager =
            BindingManager::new(db.clone(), code_issuer.clone(), token_authority.clone());
        let point_directory = PointDirectory::new(db.clone(), config.clone());
        let employee_directory = EmployeeDirectory::new(db.clone());
        let checkin_gateway = CheckinGateway::new(
            db.clone(),
            point_directory.clone(),
            employee_directory.clone(),
            config.checkin.cooldown_seconds,
        );

        tracing::info!(
            "Application context initialized (db: {})",
            config.storage.database.display()
        );

        Ok(Self {
            config,
            db,
            code_issuer,
            device_registry,
            binding_manager,
            token_authority,
            point_directory,
            employee_directory,
            checkin_gateway,
        })
    }
}
