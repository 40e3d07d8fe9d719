//! Database schema management for `weather-proxy`.
//!
//! Ensures one observation table per measurement kind plus the sensor
//! registry table exist before serving requests, and that the two backend
//! roles hold exactly the privileges their client roles need. Applied once
//! on startup through [`crate::store::Store::ensure_partitions`].

use sqlx::{PgPool, Postgres, Transaction};

use crate::models::MeasurementKind;
use crate::store::BackendRoles;

// ---

/// Table holding the append-only observations of `kind`.
pub fn partition_table(kind: MeasurementKind) -> String {
    format!("obs_{}", kind.as_str())
}

/// Create or update the database schema (idempotent).
///
/// Creates the `sensors` registry table, keyed by `sensor_name` so that
/// racing first-ingests of one sensor settle on a single row, and one
/// `obs_<kind>` table per measurement kind indexed for time and identity
/// lookups. Safe to call on every startup; no-op if objects already exist.
///
/// The connecting user must be allowed to create roles. Errors are
/// propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool, roles: &BackendRoles) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    // Replicas starting together would otherwise race on CREATE ... IF NOT EXISTS.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('weather_proxy_schema'))")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_name TEXT             PRIMARY KEY,
            latitude    DOUBLE PRECISION NOT NULL,
            longitude   DOUBLE PRECISION NOT NULL,
            city        TEXT             NOT NULL,
            county      TEXT             NOT NULL,
            state       TEXT             NOT NULL,
            zip_code    TEXT             NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for kind in MeasurementKind::ALL {
        // ---
        let table = partition_table(kind);
        let metric_type = if kind.is_textual() {
            "TEXT"
        } else {
            "DOUBLE PRECISION"
        };

        // No uniqueness on (sensor_name, time_recorded): duplicates from
        // at-least-once delivery are kept.
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id            UUID             PRIMARY KEY,
                sensor_name   TEXT             NOT NULL,
                time_recorded TIMESTAMPTZ      NOT NULL,
                latitude      DOUBLE PRECISION NOT NULL,
                longitude     DOUBLE PRECISION NOT NULL,
                city          TEXT             NOT NULL,
                county        TEXT             NOT NULL,
                state         TEXT             NOT NULL,
                zip_code      TEXT             NOT NULL,
                metric        {metric_type}    NOT NULL
            );
            "#
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS idx_{table}_sensor_time
                ON {table} (sensor_name, time_recorded DESC);
            "#
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS idx_{table}_time
                ON {table} (time_recorded DESC);
            "#
        ))
        .execute(&mut *tx)
        .await?;
    }

    grant_role_access(&mut tx, roles).await?;

    tx.commit().await?;
    Ok(())
}

/// Create both backend roles if absent and grant their privileges.
///
/// Ingest: `INSERT` on every observation table, `SELECT`/`INSERT` on
/// `sensors`. Query: `SELECT` on everything. The connecting user is made a
/// member of both so it can `SET ROLE` to either per request.
async fn grant_role_access(
    tx: &mut Transaction<'static, Postgres>,
    roles: &BackendRoles,
) -> Result<(), sqlx::Error> {
    // ---
    for role in [&roles.ingest, &roles.query] {
        sqlx::query(&format!(
            r#"
            DO $$
            BEGIN
                IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = '{role}') THEN
                    CREATE ROLE "{role}" NOLOGIN;
                END IF;
            END
            $$;
            "#
        ))
        .execute(&mut **tx)
        .await?;

        sqlx::query(&format!(r#"GRANT "{role}" TO CURRENT_USER"#))
            .execute(&mut **tx)
            .await?;
    }

    let ingest = &roles.ingest;
    let query = &roles.query;
    let mut statements = vec![
        format!(r#"GRANT SELECT, INSERT ON sensors TO "{ingest}""#),
        format!(r#"GRANT SELECT ON sensors TO "{query}""#),
    ];
    for kind in MeasurementKind::ALL {
        let table = partition_table(kind);
        statements.push(format!(r#"GRANT INSERT ON {table} TO "{ingest}""#));
        statements.push(format!(r#"GRANT SELECT ON {table} TO "{query}""#));
    }

    for statement in statements {
        sqlx::query(&statement).execute(&mut **tx).await?;
    }
    Ok(())
}
