//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration is a SQL batch that
//! transforms the schema from version N to N+1.

use rusqlite::Connection;

use credvault_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Credential identities: one row per unique name
        CREATE TABLE credentials (
            id TEXT PRIMARY KEY,              -- UUID
            name TEXT NOT NULL UNIQUE         -- normalized, starts with '/'
        );

        -- Credential versions, all types flattened
        CREATE TABLE credential_versions (
            id TEXT PRIMARY KEY,              -- UUID
            credential_id TEXT NOT NULL REFERENCES credentials(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,      -- Unix ms
            type TEXT NOT NULL,               -- type discriminator

            -- Secret payload
            encrypted_value BLOB,
            nonce BLOB,
            encryption_key_id TEXT,

            -- Generation parameters (password and user)
            parameters_value BLOB,
            parameters_nonce BLOB,
            parameters_key_id TEXT,

            public_key TEXT,
            certificate TEXT,
            ca TEXT,
            ca_name TEXT,
            transitional INTEGER NOT NULL DEFAULT 0,
            certificate_authority INTEGER NOT NULL DEFAULT 0,
            self_signed INTEGER NOT NULL DEFAULT 0,
            generated INTEGER NOT NULL DEFAULT 0,
            expiry_date INTEGER,              -- Unix ms
            username TEXT,
            salt TEXT
        );

        -- Permission rows: one per (path, actor)
        CREATE TABLE permissions (
            uuid TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            actor TEXT NOT NULL,
            operations INTEGER NOT NULL,      -- bitmask
            UNIQUE(path, actor)
        );

        -- Encryption key canaries
        CREATE TABLE encryption_key_canaries (
            id TEXT PRIMARY KEY,
            encrypted_value BLOB NOT NULL,
            nonce BLOB NOT NULL,
            salt BLOB NOT NULL
        );

        CREATE INDEX idx_versions_credential ON credential_versions(credential_id, created_at);
        CREATE INDEX idx_versions_ca_name ON credential_versions(ca_name);
        CREATE INDEX idx_versions_key ON credential_versions(encryption_key_id);
        CREATE INDEX idx_versions_parameters_key ON credential_versions(parameters_key_id);
        CREATE INDEX idx_permissions_actor ON permissions(actor);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "credentials",
            "credential_versions",
            "permissions",
            "encryption_key_canaries",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
