//! Storage adapter over an embedded SQLite database.
//!
//! The collector only needs three primitives from the backing store:
//! - `exec` for statements without a result set, retried while the engine
//!   reports contention
//! - `query` returning a forward-only cursor with typed column accessors
//! - `escape_string` for the rare literal built by concatenation
//!
//! Every statement issued through this module binds its values as parameters.
//! A [`ResultSet`] mutably borrows the [`Connection`] it was opened on, so a
//! connection can only ever have one cursor open; drain or drop it before the
//! next statement.
use std::{str::FromStr, time::Duration};

use futures::{stream::BoxStream, TryStreamExt};
use sqlx::{
    pool::PoolConnection,
    query::Query,
    sqlite::{
        Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
    },
    ColumnIndex, Row,
};

use crate::schema;

// ---

/// How long the engine itself waits on a locked database before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts made by [`Connection::exec`] while the engine keeps reporting busy.
const BUSY_RETRIES: u32 = 20;

/// Pause between two busy retries.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

// SQLite primary result codes
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Errors raised while opening, writing to or reading from the store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot open storage '{location}': {source}")]
    Open {
        location: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage still busy after {0} attempts")]
    Busy(u32),

    #[error("cursor is not positioned on a row")]
    NoRow,

    #[error("storage error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StorageError {
    /// True when the statement referenced a table that does not exist.
    pub fn is_missing_table(&self) -> bool {
        // ---
        match self {
            StorageError::Backend(sqlx::Error::Database(db)) => {
                db.message().contains("no such table")
            }
            _ => false,
        }
    }
}

/// Whether the backend refused the statement because of lock contention.
fn is_busy(err: &sqlx::Error) -> bool {
    // ---
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// A value bound to a `?N` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

fn bind_params<'q>(sql: &'q str, params: &[Param]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    // ---
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Param::Int(v) => query.bind(*v),
            Param::Real(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.clone()),
        })
}

/// Quote-doubling escape for a literal placed between single quotes.
pub fn escape_string(s: &str) -> String {
    s.replace('\'', "''")
}

// ---

/// Handle on the opened database file.
#[derive(Debug, Clone)]
pub struct Storage {
    // ---
    pool: SqlitePool,
    location: String,
}

impl Storage {
    // ---
    /// Open (or create) the database at `location` and ensure the schema.
    ///
    /// `location` is a file path, a `sqlite:` URL, or `:memory:`. An in-memory
    /// store lives only as long as a connection to it, so it is pinned to a
    /// single long-lived connection.
    pub async fn open(location: &str, max_connections: u32) -> Result<Self, StorageError> {
        // ---
        let open_err = |source: sqlx::Error| StorageError::Open {
            location: location.to_string(),
            source,
        };

        let in_memory = location == ":memory:" || location == "sqlite::memory:";
        let options = (if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(open_err)?
        } else if location.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(location).map_err(open_err)?
        } else {
            SqliteConnectOptions::new().filename(location)
        })
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.map_err(open_err)?;

        schema::create_schema(&pool).await?;

        tracing::debug!(location, in_memory, "storage opened");
        Ok(Storage {
            pool,
            location: location.to_string(),
        })
    }

    /// Check out a dedicated connection.
    pub async fn connect(&self) -> Result<Connection, StorageError> {
        // ---
        let conn = self.pool.acquire().await?;
        Ok(Connection { conn })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Close every pooled connection; later `connect` calls fail.
    pub async fn close(&self) {
        // ---
        self.pool.close().await;
        tracing::debug!(location = %self.location, "storage closed");
    }
}

/// One checked-out database connection.
pub struct Connection {
    conn: PoolConnection<Sqlite>,
}

impl Connection {
    // ---
    /// Execute a statement that yields no rows, returning the affected count.
    ///
    /// Retries with a short back-off while the engine reports busy or locked.
    pub async fn exec(&mut self, sql: &str, params: &[Param]) -> Result<u64, StorageError> {
        // ---
        let mut attempt = 0;
        loop {
            attempt += 1;
            match bind_params(sql, params).execute(&mut *self.conn).await {
                Ok(done) => return Ok(done.rows_affected()),
                Err(err) if is_busy(&err) => {
                    if attempt >= BUSY_RETRIES {
                        return Err(StorageError::Busy(attempt));
                    }
                    tracing::debug!(attempt, "storage busy, retrying statement");
                    tokio::time::sleep(BUSY_BACKOFF).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Open a forward-only cursor over the rows of `sql`.
    ///
    /// Nothing is sent to the engine until the first [`ResultSet::next`].
    pub fn query<'c>(&'c mut self, sql: &'c str, params: &[Param]) -> ResultSet<'c> {
        // ---
        ResultSet {
            rows: bind_params(sql, params).fetch(&mut *self.conn),
            current: None,
        }
    }
}

/// Single-pass cursor over a query result.
pub struct ResultSet<'c> {
    rows: BoxStream<'c, Result<SqliteRow, sqlx::Error>>,
    current: Option<SqliteRow>,
}

impl ResultSet<'_> {
    // ---
    /// Advance to the next row. Returns `false` once the result is drained.
    pub async fn next(&mut self) -> Result<bool, StorageError> {
        // ---
        self.current = self.rows.try_next().await?;
        Ok(self.current.is_some())
    }

    fn row(&self) -> Result<&SqliteRow, StorageError> {
        self.current.as_ref().ok_or(StorageError::NoRow)
    }

    pub fn get_string<I>(&self, index: I) -> Result<String, StorageError>
    where
        I: ColumnIndex<SqliteRow>,
    {
        Ok(self.row()?.try_get::<String, _>(index)?)
    }

    pub fn get_int<I>(&self, index: I) -> Result<i32, StorageError>
    where
        I: ColumnIndex<SqliteRow>,
    {
        Ok(self.row()?.try_get::<i32, _>(index)?)
    }

    pub fn get_long<I>(&self, index: I) -> Result<i64, StorageError>
    where
        I: ColumnIndex<SqliteRow>,
    {
        Ok(self.row()?.try_get::<i64, _>(index)?)
    }

    pub fn get_float<I>(&self, index: I) -> Result<f64, StorageError>
    where
        I: ColumnIndex<SqliteRow>,
    {
        Ok(self.row()?.try_get::<f64, _>(index)?)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    async fn open_memory() -> Storage {
        Storage::open(":memory:", 1).await.unwrap()
    }

    #[test]
    fn test_escape_string_doubles_quotes() {
        // ---
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(escape_string("O'Brien's"), "O''Brien''s");
        assert_eq!(escape_string("''"), "''''");
    }

    #[tokio::test]
    async fn test_exec_and_cursor_accessors() {
        // ---
        let storage = open_memory().await;
        let mut conn = storage.connect().await.unwrap();

        let affected = conn
            .exec(
                "INSERT INTO stations (id, name, description) VALUES (?1, ?2, ?3)",
                &[Param::Int(7), "Roof".into(), "north side".into()],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let mut rs = conn.query(
            "SELECT id, name, description FROM stations WHERE id = ?1",
            &[Param::Int(7)],
        );
        assert!(rs.next().await.unwrap());
        assert_eq!(rs.get_long(0).unwrap(), 7);
        assert_eq!(rs.get_int("id").unwrap(), 7);
        assert_eq!(rs.get_string("name").unwrap(), "Roof");
        assert_eq!(rs.get_string(2).unwrap(), "north side");
        assert!(!rs.next().await.unwrap());
        assert!(matches!(rs.get_long(0), Err(StorageError::NoRow)));
    }

    #[tokio::test]
    async fn test_get_float_reads_real_columns() {
        // ---
        let storage = open_memory().await;
        let mut conn = storage.connect().await.unwrap();
        conn.exec(
            "INSERT INTO lightnings (station_id, timestamp, distance) VALUES (?1, ?2, ?3)",
            &[Param::Int(1), Param::Int(100), Param::Real(12.5)],
        )
        .await
        .unwrap();

        let mut rs = conn.query("SELECT distance FROM lightnings", &[]);
        assert!(rs.next().await.unwrap());
        assert_eq!(rs.get_float("distance").unwrap(), 12.5);
    }

    #[tokio::test]
    async fn test_cursor_on_fresh_query_has_no_row() {
        // ---
        let storage = open_memory().await;
        let mut conn = storage.connect().await.unwrap();
        let rs = conn.query("SELECT id FROM stations", &[]);
        assert!(matches!(rs.get_long(0), Err(StorageError::NoRow)));
    }

    #[tokio::test]
    async fn test_missing_table_is_recognised() {
        // ---
        let storage = open_memory().await;
        let mut conn = storage.connect().await.unwrap();

        let err = conn
            .exec("DELETE FROM station_42", &[])
            .await
            .unwrap_err();
        assert!(err.is_missing_table(), "unexpected error: {err}");

        let mut rs = conn.query("SELECT timestamp FROM station_42", &[]);
        let err = rs.next().await.unwrap_err();
        assert!(err.is_missing_table());
    }

    #[tokio::test]
    async fn test_syntax_error_is_reported_not_missing_table() {
        // ---
        let storage = open_memory().await;
        let mut conn = storage.connect().await.unwrap();

        let err = conn.exec("INSERT INTO", &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert!(!err.is_missing_table());
    }

    #[tokio::test]
    async fn test_file_backed_storage_persists_across_reopen() {
        // ---
        let path = std::env::temp_dir().join(format!("meteod-{}.db", uuid::Uuid::new_v4()));
        let location = path.to_string_lossy().to_string();

        let storage = Storage::open(&location, 2).await.unwrap();
        assert_eq!(storage.location(), location);
        let mut conn = storage.connect().await.unwrap();
        conn.exec(
            "INSERT INTO stations (id, name, description) VALUES (?1, ?2, '')",
            &[Param::Int(3), "Cellar".into()],
        )
        .await
        .unwrap();
        drop(conn);
        storage.close().await;

        let reopened = Storage::open(&location, 2).await.unwrap();
        let mut conn = reopened.connect().await.unwrap();
        let mut rs = conn.query("SELECT name FROM stations WHERE id = 3", &[]);
        assert!(rs.next().await.unwrap());
        assert_eq!(rs.get_string(0).unwrap(), "Cellar");
        drop(rs);
        drop(conn);
        reopened.close().await;

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_closed_storage_refuses_connections() {
        // ---
        let storage = open_memory().await;
        storage.close().await;
        assert!(storage.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_open_fails_for_unreachable_location() {
        // ---
        let err = Storage::open("/nonexistent-dir/meteod/meteod.db", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Open { .. }));
    }
}
