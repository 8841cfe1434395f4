//! Savepoint helpers for per-step isolation inside a note transaction.

use sqlx::{Connection, PgConnection, Postgres, Transaction};

use notegraph_core::{Error, Result};

/// Open a savepoint on an existing transaction (or a plain transaction on a
/// bare connection).
pub async fn savepoint(conn: &mut PgConnection) -> Result<Transaction<'_, Postgres>> {
    conn.begin().await.map_err(Error::Database)
}

/// Release the savepoint when the step succeeded, roll it back otherwise.
///
/// The outer `Result` carries savepoint failures, which poison the enclosing
/// transaction. The inner one is the step's own outcome.
pub async fn settle<T>(sp: Transaction<'_, Postgres>, outcome: Result<T>) -> Result<Result<T>> {
    match outcome {
        Ok(value) => {
            sp.commit().await.map_err(Error::Database)?;
            Ok(Ok(value))
        }
        Err(e) => {
            sp.rollback().await.map_err(Error::Database)?;
            Ok(Err(e))
        }
    }
}
