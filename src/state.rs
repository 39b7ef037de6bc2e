use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    connection::{SimpleConnection, TransactionManager},
    r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{sitemodule::ModuleRegistry, util_resp::FailureResponse};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub key: Key,
    pub registry: Arc<ModuleRegistry>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl FromRef<AppState> for Arc<ModuleRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

/// SQLite only enforces foreign keys (and therefore the cascades in the
/// schema) when asked to, once per connection.
#[derive(Debug)]
pub struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn build_pool(db_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .connection_customizer(Box::new(SqlitePragmas))
        .build(ConnectionManager::<SqliteConnection>::new(db_url))
}

/// The per-request connection slot. It is inserted by [`tx_commit`] before
/// the handler runs and filled lazily by the first extractor which needs a
/// transactional connection, so that the user lookup and the handler share
/// one connection (and one transaction).
#[derive(Clone, Default)]
pub struct ThreadSafeConn {
    pub inner: Arc<Mutex<Option<DbConn>>>,
}

impl ThreadSafeConn {
    async fn ensure_open(&self, pool: &DbPool) -> Result<(), FailureResponse> {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let pool = pool.clone();
        let mut conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| {
                tracing::error!("connection task failed: {e}");
                FailureResponse::ServerError(())
            })?
            .map_err(|e| {
                tracing::error!("failed to check out a connection: {e}");
                FailureResponse::ServerError(())
            })?;

        <DbConn as diesel::Connection>::TransactionManager::begin_transaction(
            &mut conn,
        )?;

        *slot = Some(conn);
        Ok(())
    }

    pub fn from_parts(parts: &Parts) -> Result<Self, FailureResponse> {
        parts.extensions.get::<ThreadSafeConn>().cloned().ok_or_else(|| {
            tracing::error!("no connection slot; is `tx_commit` installed?");
            FailureResponse::ServerError(())
        })
    }

    pub async fn open(
        parts: &Parts,
        pool: &DbPool,
    ) -> Result<Self, FailureResponse> {
        let slot = Self::from_parts(parts)?;
        slot.ensure_open(pool).await?;
        Ok(slot)
    }
}

/// Commits the request's transaction (if one was opened) when the response
/// is a success or a redirect, and rolls it back otherwise.
pub async fn tx_commit(mut req: Request, next: Next) -> Response {
    let slot = ThreadSafeConn::default();
    req.extensions_mut().insert(slot.clone());

    let res = next.run(req).await;

    let mut guard = slot.inner.lock().await;
    if let Some(conn) = guard.as_mut() {
        let status = res.status();
        let outcome = if status.is_success()
            || status.is_redirection()
            || status.is_informational()
        {
            <DbConn as diesel::Connection>::TransactionManager::commit_transaction(conn)
        } else {
            tracing::debug!(%status, "rolling back request transaction");
            <DbConn as diesel::Connection>::TransactionManager::rollback_transaction(conn)
        };

        if let Err(e) = outcome {
            tracing::error!("failed to finish request transaction: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    res
}

enum Held {
    Shared(OwnedMutexGuard<Option<DbConn>>),
    Owned(DbConn),
}

/// A database connection for the duration of a handler. With `TX = true` the
/// connection is the request's transactional connection; with `TX = false`
/// it is a plain pooled connection in autocommit mode.
pub struct Conn<const TX: bool> {
    held: Held,
}

impl<const TX: bool> Deref for Conn<TX> {
    type Target = DbConn;

    fn deref(&self) -> &Self::Target {
        match &self.held {
            Held::Shared(guard) => guard
                .as_ref()
                .expect("the slot is filled before the guard is handed out"),
            Held::Owned(conn) => conn,
        }
    }
}

impl<const TX: bool> DerefMut for Conn<TX> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.held {
            Held::Shared(guard) => guard
                .as_mut()
                .expect("the slot is filled before the guard is handed out"),
            Held::Owned(conn) => conn,
        }
    }
}

#[async_trait]
impl<S, const TX: bool> FromRequestParts<S> for Conn<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = FailureResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let pool = DbPool::from_ref(state);

        if TX {
            let slot = ThreadSafeConn::open(parts, &pool).await?;
            Ok(Conn {
                held: Held::Shared(slot.inner.lock_owned().await),
            })
        } else {
            let conn = tokio::task::spawn_blocking(move || pool.get())
                .await
                .map_err(|_| FailureResponse::ServerError(()))?
                .map_err(|e| {
                    tracing::error!("failed to check out a connection: {e}");
                    FailureResponse::ServerError(())
                })?;
            Ok(Conn {
                held: Held::Owned(conn),
            })
        }
    }
}
