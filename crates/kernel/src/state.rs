//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::metrics::Metrics;
use crate::models::{Contact, Entity, Form, Page, User};
use crate::repository::Repository;
use crate::store::{DocumentStore, MemoryCollection, PgCollection};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,

    /// PostgreSQL pool; None when collections live in memory.
    db: Option<PgPool>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    users: Repository<User>,
    pages: Repository<Page>,
    contacts: Repository<Contact>,
    forms: Repository<Form>,
}

/// One store per entity collection.
struct Stores {
    users: Arc<dyn DocumentStore>,
    pages: Arc<dyn DocumentStore>,
    contacts: Arc<dyn DocumentStore>,
    forms: Arc<dyn DocumentStore>,
}

impl AppState {
    /// Connect to the configured backend and build every repository.
    pub async fn new(config: &Config) -> Result<Self> {
        let Some(url) = &config.database_url else {
            warn!("DATABASE_URL not set; collections are held in memory");
            return Self::in_memory(config.clone());
        };

        let pool = db::create_pool(url, config.database_max_connections).await?;
        info!("PostgreSQL connection established");

        let stores = Stores {
            users: pg_store::<User>(&pool).await?,
            pages: pg_store::<Page>(&pool).await?,
            contacts: pg_store::<Contact>(&pool).await?,
            forms: pg_store::<Form>(&pool).await?,
        };
        Self::assemble(config.clone(), Some(pool), stores)
    }

    /// State backed by in-memory collections.
    pub fn in_memory(config: Config) -> Result<Self> {
        let stores = Stores {
            users: memory_store::<User>(),
            pages: memory_store::<Page>(),
            contacts: memory_store::<Contact>(),
            forms: memory_store::<Form>(),
        };
        Self::assemble(config, None, stores)
    }

    fn assemble(config: Config, db: Option<PgPool>, stores: Stores) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let max = config.query_max_limit;
        let inner = AppStateInner {
            users: repository(stores.users, max, &metrics)?,
            pages: repository(stores.pages, max, &metrics)?,
            contacts: repository(stores.contacts, max, &metrics)?,
            forms: repository(stores.forms, max, &metrics)?,
            config,
            db,
            metrics,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Error traces are attached outside production.
    pub fn expose_trace(&self) -> bool {
        !self.inner.config.is_production()
    }

    /// Name of the active storage backend.
    pub fn storage_backend(&self) -> &'static str {
        if self.inner.db.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    /// Check that the storage backend answers.
    pub async fn storage_healthy(&self) -> bool {
        match &self.inner.db {
            Some(pool) => db::check_health(pool).await,
            None => true,
        }
    }

    pub fn users(&self) -> &Repository<User> {
        &self.inner.users
    }

    pub fn pages(&self) -> &Repository<Page> {
        &self.inner.pages
    }

    pub fn contacts(&self) -> &Repository<Contact> {
        &self.inner.contacts
    }

    pub fn forms(&self) -> &Repository<Form> {
        &self.inner.forms
    }
}

async fn pg_store<E: Entity>(pool: &PgPool) -> Result<Arc<dyn DocumentStore>> {
    let collection = PgCollection::new(pool.clone(), E::COLLECTION, E::collection_schema())?;
    collection
        .ensure_collection()
        .await
        .with_context(|| format!("failed to prepare collection {}", E::COLLECTION))?;
    Ok(Arc::new(collection))
}

fn memory_store<E: Entity>() -> Arc<dyn DocumentStore> {
    Arc::new(MemoryCollection::new(E::COLLECTION, E::collection_schema()))
}

fn repository<E: Entity>(
    store: Arc<dyn DocumentStore>,
    max_limit: u32,
    metrics: &Arc<Metrics>,
) -> Result<Repository<E>> {
    let schema = E::query_schema(max_limit)
        .with_context(|| format!("invalid query schema for {}", E::COLLECTION))?;
    Ok(Repository::new(store, Arc::new(schema), metrics.clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_state_is_healthy() {
        let state = AppState::in_memory(Config::default()).unwrap();
        assert_eq!(state.storage_backend(), "memory");
        assert!(state.storage_healthy().await);
        assert!(state.expose_trace());
        assert_eq!(state.users().collection(), "users");
        assert_eq!(state.pages().schema().max_limit(), 50);
    }

    #[test]
    fn global_limit_caps_entity_limits() {
        let config = Config {
            query_max_limit: 25,
            ..Config::default()
        };
        let state = AppState::in_memory(config).unwrap();
        assert_eq!(state.users().schema().max_limit(), 25);
        assert_eq!(state.forms().schema().max_limit(), 25);
    }
}
