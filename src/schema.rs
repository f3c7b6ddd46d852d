//! Database schema management for `meteod`.
//!
//! Ensures required tables and indexes exist before the collector touches the
//! store. Applied every time storage is opened (see `storage::Storage::open`).

use sqlx::SqlitePool;

// ---

/// Create the database schema (idempotent).
///
/// Creates the `stations` registry, the `readings` table holding the flushed
/// smoothed samples of every station, and the `lightnings` table. Rows are
/// keyed by `(station_id, timestamp)` so a repeated write for the same second
/// replaces the earlier one. Safe to call on every startup; no-op if objects
/// already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    // Station directory served by `/nodes`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            id          INTEGER PRIMARY KEY,
            name        TEXT    NOT NULL DEFAULT '',
            description TEXT    NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Flushed weather samples served by `/node`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            station_id  INTEGER NOT NULL,
            timestamp   INTEGER NOT NULL,
            temperature REAL    NOT NULL,
            humidity    REAL    NOT NULL,
            pressure    REAL    NOT NULL,
            light_ir    REAL    NOT NULL,
            light_vis   REAL    NOT NULL,
            PRIMARY KEY (station_id, timestamp)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Lightning events served by `/lightnings`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lightnings (
            station_id  INTEGER NOT NULL,
            timestamp   INTEGER NOT NULL,
            distance    REAL    NOT NULL,
            PRIMARY KEY (station_id, timestamp)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Cross-station time range scans
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_lightnings_timestamp
            ON lightnings (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_timestamp
            ON readings (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        // ---
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        // ---
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["lightnings", "readings", "stations"]);
    }

    #[tokio::test]
    async fn test_readings_are_keyed_by_station_and_timestamp() {
        // ---
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();

        for t in [20.0_f64, 25.0] {
            sqlx::query(
                "INSERT OR REPLACE INTO readings VALUES (1, 1000, ?1, 50.0, 1000.0, 1.0, 2.0)",
            )
            .bind(t)
            .execute(&pool)
            .await
            .unwrap();
        }

        let rows: Vec<(f64,)> = sqlx::query_as("SELECT temperature FROM readings")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows, vec![(25.0,)]);
    }
}
