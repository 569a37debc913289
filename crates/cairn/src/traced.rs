//! Traced database access.
//!
//! Everything cairn sends to the store goes through [`TracedConn`], which
//! opens a `tracing` span per statement carrying the SQL, the parameter count
//! and the row count. Run with `RUST_LOG=cairn=debug` to see the catalog
//! queries of a validation run.

use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Something statements can run on.
///
/// Implemented for `tokio_postgres::Client` and pooled
/// `deadpool_postgres::Object`s.
pub trait Connection: Send + Sync {
    /// Run a query, returning all rows.
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>>;

    /// Run several `;`-separated statements without parameters.
    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()>;

    /// Whether the underlying connection has been closed.
    fn is_closed(&self) -> bool;
}

impl Connection for tokio_postgres::Client {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(tokio_postgres::Client::batch_execute(self, sql))
    }

    fn is_closed(&self) -> bool {
        tokio_postgres::Client::is_closed(self)
    }
}

impl Connection for deadpool_postgres::Object {
    // Go through the client explicitly; `self.query` would recurse.
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
        Connection::query(client(self), sql, params)
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Connection::batch_execute(client(self), sql)
    }

    fn is_closed(&self) -> bool {
        client(self).is_closed()
    }
}

fn client(object: &deadpool_postgres::Object) -> &tokio_postgres::Client {
    object.deref()
}

/// A connection whose statements are logged via tracing.
pub struct TracedConn<'a, C: Connection + ?Sized> {
    conn: &'a C,
}

impl<'a, C: Connection + ?Sized> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .conn
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!(
            "db.batch_execute",
            statements = sql.matches(';').count(),
        );
        self.conn.batch_execute(sql).instrument(span).await
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}

/// Wrap any connection in a [`TracedConn`].
pub trait ConnectionExt: Connection {
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection + ?Sized> ConnectionExt for C {}
