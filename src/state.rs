use dashmap::DashMap;
use shared::{AuthService, Config, Database, SenderClient, TextGenClient, VisionClient};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shared application state: database pool, typed clients and the per-user
/// lock table that serializes gamification/ticket mutations.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub auth: Arc<AuthService>,
    pub vision: VisionClient,
    pub textgen: TextGenClient,
    pub sender: SenderClient,
    user_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        let database = Database::connect(&config.database).await?;
        let auth = AuthService::new(&config.auth)?;
        let vision = VisionClient::new(&config.services)?;
        let textgen = TextGenClient::new(&config.services)?;
        let sender = SenderClient::new(&config.services)?;

        Ok(AppState {
            db_pool: database.pool().clone(),
            auth: Arc::new(auth),
            vision,
            textgen,
            sender,
            config: Arc::new(config),
            user_locks: Arc::new(DashMap::new()),
        })
    }

    /// Lock guarding all mutations for one user. Tickets of the same user
    /// are processed strictly one at a time; streak and duplicate semantics
    /// depend on it.
    pub fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
