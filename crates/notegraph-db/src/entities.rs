//! Entity resolution: people, companies, and projects.
//!
//! Mentions are deduplicated on `(user_id, normalized_name)` with a single
//! upsert. Whether the row was inserted comes from `xmax = 0` on the
//! returned tuple, so concurrent resolvers of the same name never race
//! between an existence check and an insert.

use sqlx::{PgConnection, Pool, Postgres, Row};
use tracing::trace;
use uuid::Uuid;

use notegraph_core::{
    new_v7, normalize_name, Entity, EntityExtra, EntityKind, Error, KnownNames, ResolvedEntity,
    Result,
};

/// Build the upsert statement for a kind.
///
/// `$5` is the optional kind-specific attribute; `$6` is its insert default.
fn upsert_sql(kind: EntityKind) -> String {
    let table = kind.table();
    match kind.extra_column() {
        None => format!(
            "INSERT INTO {table} (id, user_id, name, normalized_name)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, normalized_name) DO UPDATE
                 SET name = EXCLUDED.name, updated_at = now()
             RETURNING id, name, (xmax = 0) AS inserted"
        ),
        Some(col) => format!(
            "INSERT INTO {table} (id, user_id, name, normalized_name, {col})
             VALUES ($1, $2, $3, $4, COALESCE($5::text, $6::text))
             ON CONFLICT (user_id, normalized_name) DO UPDATE
                 SET name = EXCLUDED.name,
                     {col} = COALESCE($5::text, {table}.{col}),
                     updated_at = now()
             RETURNING id, name, (xmax = 0) AS inserted"
        ),
    }
}

/// Find or create an entity on an existing connection or transaction.
pub async fn find_or_create_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    user_id: Uuid,
    name: &str,
    extra: Option<&EntityExtra>,
) -> Result<ResolvedEntity> {
    let display = name.trim();
    let normalized = normalize_name(display)?;

    let sql = upsert_sql(kind);
    let mut query = sqlx::query(&sql)
        .bind(new_v7())
        .bind(user_id)
        .bind(display)
        .bind(&normalized);
    if kind.extra_column().is_some() {
        query = query
            .bind(extra.and_then(|e| e.value_for(kind)))
            .bind(kind.default_extra());
    }

    let row = query
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Database)?;

    let resolved = ResolvedEntity {
        id: row.get("id"),
        name: row.get("name"),
        is_new: row.get("inserted"),
    };

    trace!(
        subsystem = "db",
        component = "entity_resolver",
        op = "find_or_create",
        entity_kind = kind.as_str(),
        normalized_name = %normalized,
        is_new = resolved.is_new,
        "Resolved entity"
    );
    Ok(resolved)
}

/// Link a note to an entity. Returns true when a new link was inserted.
pub async fn link_in(
    conn: &mut PgConnection,
    kind: EntityKind,
    note_id: Uuid,
    entity_id: Uuid,
) -> Result<bool> {
    let sql = format!(
        "INSERT INTO {} (note_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        kind.link_table(),
        kind.link_column()
    );
    let result = sqlx::query(&sql)
        .bind(note_id)
        .bind(entity_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

    Ok(result.rows_affected() == 1)
}

/// PostgreSQL entity repository.
#[derive(Clone)]
pub struct PgEntityRepository {
    pool: Pool<Postgres>,
}

impl PgEntityRepository {
    /// Create a new PgEntityRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Upsert keyed on `(user_id, normalize(name))`.
    pub async fn find_or_create(
        &self,
        kind: EntityKind,
        user_id: Uuid,
        name: &str,
        extra: Option<&EntityExtra>,
    ) -> Result<ResolvedEntity> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        find_or_create_in(&mut conn, kind, user_id, name, extra).await
    }

    /// Idempotent note-to-entity link.
    pub async fn link(&self, kind: EntityKind, note_id: Uuid, entity_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        link_in(&mut conn, kind, note_id, entity_id).await
    }

    pub async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>> {
        let extra = kind.extra_column().unwrap_or("NULL");
        let sql = format!(
            "SELECT id, user_id, name, normalized_name, {extra}::text AS extra, created_at, updated_at
             FROM {} WHERE id = $1",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|row| {
            let extra: Option<String> = row.get("extra");
            Entity {
                id: row.get("id"),
                user_id: row.get("user_id"),
                kind,
                name: row.get("name"),
                normalized_name: row.get("normalized_name"),
                category: if kind == EntityKind::Company { extra.clone() } else { None },
                status: if kind == EntityKind::Project { extra } else { None },
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }
        }))
    }

    /// Count of entities of a kind owned by a user.
    pub async fn count_for_user(&self, kind: EntityKind, user_id: Uuid) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE user_id = $1", kind.table());
        sqlx::query_scalar(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    /// Most recently touched entity names per kind, for extraction context.
    pub async fn known_names(&self, user_id: Uuid, limit: i64) -> Result<KnownNames> {
        let mut names = KnownNames::default();
        for kind in EntityKind::ALL {
            let sql = format!(
                "SELECT name FROM {} WHERE user_id = $1 ORDER BY updated_at DESC, name LIMIT $2",
                kind.table()
            );
            let rows: Vec<String> = sqlx::query_scalar(&sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
            match kind {
                EntityKind::Person => names.people = rows,
                EntityKind::Company => names.companies = rows,
                EntityKind::Project => names.projects = rows,
            }
        }
        Ok(names)
    }

    /// Entity ids of a kind linked to a note.
    pub async fn linked_ids(&self, kind: EntityKind, note_id: Uuid) -> Result<Vec<Uuid>> {
        let sql = format!(
            "SELECT {col} FROM {table} WHERE note_id = $1 ORDER BY {col}",
            col = kind.link_column(),
            table = kind.link_table()
        );
        sqlx::query_scalar(&sql)
            .bind(note_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
