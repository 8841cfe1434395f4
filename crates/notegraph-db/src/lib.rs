//! # notegraph-db
//!
//! PostgreSQL persistence for the notegraph enrichment pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The enrichment queue (`FOR UPDATE SKIP LOCKED` claims)
//! - Entity resolution with conflict-safe upserts
//! - Enrichment writes: summaries, tags, embeddings, action items, relationships
//! - Clarifications and project suggestion storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use notegraph_db::{Database, QueueRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/notegraph").await?;
//!     db.migrate().await?;
//!
//!     let batch = db.queue.claim_batch(10).await?;
//!     println!("Claimed {} items", batch.len());
//!     Ok(())
//! }
//! ```

pub mod action_items;
pub mod clarifications;
pub mod entities;
pub mod notes;
pub mod pool;
pub mod projects;
pub mod queue;
pub mod relationships;
#[cfg(feature = "migrations")]
pub mod test_fixtures;
pub mod tx;

pub use action_items::{NewActionItem, PgActionItemRepository};
pub use clarifications::PgClarificationRepository;
pub use entities::PgEntityRepository;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use projects::PgProjectRepository;
pub use queue::PgQueueRepository;
pub use relationships::{PgRelationshipRepository, RelationshipUpsert};

// Re-export core types for convenience
pub use notegraph_core::*;

/// Combined database access bundling every repository.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Enrichment work queue.
    pub queue: PgQueueRepository,
    /// Entity resolver.
    pub entities: PgEntityRepository,
    /// Note reads and enrichment writes.
    pub notes: PgNoteRepository,
    /// Action items.
    pub action_items: PgActionItemRepository,
    /// Entity relationships.
    pub relationships: PgRelationshipRepository,
    /// Clarification questions.
    pub clarifications: PgClarificationRepository,
    /// Project catalog and suggestions.
    pub projects: PgProjectRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            queue: PgQueueRepository::new(pool.clone()),
            entities: PgEntityRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            action_items: PgActionItemRepository::new(pool.clone()),
            relationships: PgRelationshipRepository::new(pool.clone()),
            clarifications: PgClarificationRepository::new(pool.clone()),
            projects: PgProjectRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to database with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
