//! SQLite implementation of the store traits.
//!
//! The primary storage backend. It uses rusqlite with bundled SQLite, wrapped
//! in async via tokio::spawn_blocking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use credvault_core::{
    Credential, CredentialId, CredentialVersionRecord, PermissionData, PermissionId,
    PermissionOperations, VersionId,
};
use credvault_crypto::{EncryptedValue, EncryptionKeyCanary, EncryptionKeyId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CredentialStore, CredentialSummary, KeyCanaryStore, PermissionStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

const SELECT_RECORD: &str = "SELECT v.id, v.credential_id, c.name, v.created_at, v.type,
        v.encrypted_value, v.nonce, v.encryption_key_id,
        v.parameters_value, v.parameters_nonce, v.parameters_key_id,
        v.public_key, v.certificate, v.ca, v.ca_name,
        v.transitional, v.certificate_authority, v.self_signed, v.generated,
        v.expiry_date, v.username, v.salt
    FROM credential_versions v JOIN credentials c ON c.id = v.credential_id";

const NEWEST_FIRST: &str = "ORDER BY v.created_at DESC, v.rowid DESC";

fn parse_uuid(idx: usize, text: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    parse_uuid(idx, &text)
}

/// Read an encrypted value from three consecutive columns: ciphertext,
/// nonce, key id.
fn encrypted_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<EncryptedValue> {
    let key_id: Option<String> = row.get(idx + 2)?;
    let Some(key_id) = key_id else {
        return Ok(EncryptedValue::empty());
    };
    let value: Option<Vec<u8>> = row.get(idx)?;
    let nonce: Option<Vec<u8>> = row.get(idx + 1)?;
    Ok(EncryptedValue::new(
        EncryptionKeyId::from_uuid(parse_uuid(idx + 2, &key_id)?),
        value.unwrap_or_default(),
        nonce.unwrap_or_default(),
    ))
}

fn encrypted_parts(value: &EncryptedValue) -> (Option<Vec<u8>>, Option<Vec<u8>>, Option<String>) {
    match value.encryption_key_id {
        Some(id) => (
            Some(value.encrypted_value.to_vec()),
            Some(value.nonce.to_vec()),
            Some(id.to_string()),
        ),
        None => (None, None, None),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CredentialVersionRecord> {
    Ok(CredentialVersionRecord {
        id: VersionId::from_uuid(uuid_column(row, 0)?),
        credential: Credential {
            id: CredentialId::from_uuid(uuid_column(row, 1)?),
            name: row.get(2)?,
        },
        created_at: row.get(3)?,
        type_tag: row.get(4)?,
        encrypted_value: encrypted_column(row, 5)?,
        encrypted_generation_parameters: encrypted_column(row, 8)?,
        public_key: row.get(11)?,
        certificate: row.get(12)?,
        ca: row.get(13)?,
        ca_name: row.get(14)?,
        transitional: row.get(15)?,
        certificate_authority: row.get(16)?,
        self_signed: row.get(17)?,
        generated: row.get(18)?,
        expiry_date: row.get(19)?,
        username: row.get(20)?,
        salt: row.get(21)?,
    })
}

fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: CredentialId::from_uuid(uuid_column(row, 0)?),
        name: row.get(1)?,
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<CredentialSummary> {
    Ok(CredentialSummary {
        name: row.get(0)?,
        version_created_at: row.get(1)?,
    })
}

fn row_to_permission(row: &Row<'_>) -> rusqlite::Result<PermissionData> {
    let bits: i64 = row.get(3)?;
    Ok(PermissionData {
        uuid: PermissionId::from_uuid(uuid_column(row, 0)?),
        path: row.get(1)?,
        actor: row.get(2)?,
        operations: PermissionOperations::from_bits((bits & 0xff) as u8),
    })
}

fn row_to_canary(row: &Row<'_>) -> rusqlite::Result<EncryptionKeyCanary> {
    let value: Vec<u8> = row.get(1)?;
    let nonce: Vec<u8> = row.get(2)?;
    let salt: Vec<u8> = row.get(3)?;
    Ok(EncryptionKeyCanary {
        id: EncryptionKeyId::from_uuid(uuid_column(row, 0)?),
        encrypted_canary_value: Bytes::from(value),
        nonce: Bytes::from(nonce),
        salt: Bytes::from(salt),
    })
}

/// `?1, ?2, ...` for `n` parameters starting at `first`.
fn placeholders(first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn find_credential_id(conn: &Connection, name: &str) -> Result<Option<CredentialId>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM credentials WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    id.map(|id| {
        parse_uuid(0, &id)
            .map(CredentialId::from_uuid)
            .map_err(StoreError::from)
    })
    .transpose()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn query_records(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<CredentialVersionRecord>> {
    let sql = format!("{} WHERE {} {}", SELECT_RECORD, filter, NEWEST_FIRST);
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params, row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn find_credential(&self, name: &str) -> Result<Option<Credential>> {
        let name = name.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, name FROM credentials WHERE name = ?1",
                params![name],
                row_to_credential,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_credential_by_id(&self, id: &CredentialId) -> Result<Option<Credential>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, name FROM credentials WHERE id = ?1",
                params![id],
                row_to_credential,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn delete_credential(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM credentials WHERE name = ?1", params![name])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn save(&self, record: &CredentialVersionRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let credential = &record.credential;

            match find_credential_id(&tx, &credential.name)? {
                Some(existing) if existing != credential.id => {
                    return Err(StoreError::Conflict {
                        name: credential.name.clone(),
                        existing,
                    });
                }
                Some(_) => {}
                None => {
                    let inserted = tx.execute(
                        "INSERT INTO credentials (id, name) VALUES (?1, ?2)",
                        params![credential.id.to_string(), credential.name],
                    );
                    if let Err(e) = inserted {
                        if is_constraint_violation(&e) {
                            return Err(StoreError::InvalidData(format!(
                                "credential {} already exists under another name",
                                credential.id
                            )));
                        }
                        return Err(e.into());
                    }
                }
            }

            let (value, nonce, key_id) = encrypted_parts(&record.encrypted_value);
            let (p_value, p_nonce, p_key_id) =
                encrypted_parts(&record.encrypted_generation_parameters);

            tx.execute(
                "INSERT INTO credential_versions (
                    id, credential_id, created_at, type,
                    encrypted_value, nonce, encryption_key_id,
                    parameters_value, parameters_nonce, parameters_key_id,
                    public_key, certificate, ca, ca_name,
                    transitional, certificate_authority, self_signed, generated,
                    expiry_date, username, salt
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                          ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                ON CONFLICT(id) DO UPDATE SET
                    encrypted_value = excluded.encrypted_value,
                    nonce = excluded.nonce,
                    encryption_key_id = excluded.encryption_key_id,
                    parameters_value = excluded.parameters_value,
                    parameters_nonce = excluded.parameters_nonce,
                    parameters_key_id = excluded.parameters_key_id,
                    public_key = excluded.public_key,
                    certificate = excluded.certificate,
                    ca = excluded.ca,
                    ca_name = excluded.ca_name,
                    transitional = excluded.transitional,
                    certificate_authority = excluded.certificate_authority,
                    self_signed = excluded.self_signed,
                    generated = excluded.generated,
                    expiry_date = excluded.expiry_date,
                    username = excluded.username,
                    salt = excluded.salt",
                params![
                    record.id.to_string(),
                    credential.id.to_string(),
                    record.created_at,
                    record.type_tag,
                    value,
                    nonce,
                    key_id,
                    p_value,
                    p_nonce,
                    p_key_id,
                    record.public_key,
                    record.certificate,
                    record.ca,
                    record.ca_name,
                    record.transitional,
                    record.certificate_authority,
                    record.self_signed,
                    record.generated,
                    record.expiry_date,
                    record.username,
                    record.salt,
                ],
            )?;

            tx.commit()?;
            tracing::debug!(name = %credential.name, version = %record.id, "saved credential version");
            Ok(())
        })
        .await
    }

    async fn find_most_recent(&self, name: &str) -> Result<Option<CredentialVersionRecord>> {
        let name = name.to_string();
        self.run(move |conn| {
            let sql = format!("{} WHERE c.name = ?1 {} LIMIT 1", SELECT_RECORD, NEWEST_FIRST);
            conn.query_row(&sql, params![name], row_to_record)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_by_uuid(&self, id: &VersionId) -> Result<Option<CredentialVersionRecord>> {
        let id = id.to_string();
        self.run(move |conn| {
            let sql = format!("{} WHERE v.id = ?1", SELECT_RECORD);
            conn.query_row(&sql, params![id], row_to_record)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<CredentialVersionRecord>> {
        let name = name.to_string();
        self.run(move |conn| query_records(conn, "c.name = ?1", params![name]))
            .await
    }

    async fn find_all_by_credential_id(
        &self,
        id: &CredentialId,
    ) -> Result<Vec<CredentialVersionRecord>> {
        let id = id.to_string();
        self.run(move |conn| query_records(conn, "v.credential_id = ?1", params![id]))
            .await
    }

    async fn delete_version(&self, id: &VersionId) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let deleted =
                conn.execute("DELETE FROM credential_versions WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn find_all_certificates_by_ca_name(&self, ca_name: &str) -> Result<Vec<Credential>> {
        let ca_name = ca_name.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT c.id, c.name
                 FROM credentials c JOIN credential_versions v ON v.credential_id = c.id
                 WHERE v.type = 'certificate' AND v.ca_name = ?1
                 ORDER BY c.name",
            )?;
            let credentials = stmt
                .query_map(params![ca_name], row_to_credential)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(credentials)
        })
        .await
    }

    async fn find_all_certificates(&self) -> Result<Vec<Credential>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT c.id, c.name
                 FROM credentials c JOIN credential_versions v ON v.credential_id = c.id
                 WHERE v.type = 'certificate'
                 ORDER BY c.name",
            )?;
            let credentials = stmt
                .query_map([], row_to_credential)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(credentials)
        })
        .await
    }

    async fn find_names_starting_with(&self, prefix: &str) -> Result<Vec<CredentialSummary>> {
        let prefix = prefix.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.name, MAX(v.created_at) AS latest
                 FROM credentials c JOIN credential_versions v ON v.credential_id = c.id
                 WHERE substr(c.name, 1, length(?1)) = ?1
                 GROUP BY c.id
                 ORDER BY latest DESC, c.name ASC",
            )?;
            let summaries = stmt
                .query_map(params![prefix], row_to_summary)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
        .await
    }

    async fn find_names_containing(&self, fragment: &str) -> Result<Vec<CredentialSummary>> {
        let fragment = fragment.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.name, MAX(v.created_at) AS latest
                 FROM credentials c JOIN credential_versions v ON v.credential_id = c.id
                 WHERE instr(c.name, ?1) > 0
                 GROUP BY c.id
                 ORDER BY latest DESC, c.name ASC",
            )?;
            let summaries = stmt
                .query_map(params![fragment], row_to_summary)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
        .await
    }

    async fn find_encrypted_with(
        &self,
        key_ids: &[EncryptionKeyId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CredentialVersionRecord>> {
        if key_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = key_ids.iter().map(|id| id.to_string()).collect();
        self.run(move |conn| {
            let list = placeholders(1, ids.len());
            let sql = format!(
                "{} WHERE v.encryption_key_id IN ({list}) OR v.parameters_key_id IN ({list})
                 ORDER BY v.rowid LIMIT {limit} OFFSET {offset}",
                SELECT_RECORD,
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params_from_iter(ids.iter()), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn count_by_encryption_key(&self) -> Result<HashMap<EncryptionKeyId, u64>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT encryption_key_id, COUNT(*) FROM credential_versions
                 WHERE encryption_key_id IS NOT NULL
                 GROUP BY encryption_key_id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let id = uuid_column(row, 0)?;
                    let count: i64 = row.get(1)?;
                    Ok((EncryptionKeyId::from_uuid(id), count as u64))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(rows)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn save_permission(&self, data: &PermissionData) -> Result<()> {
        let data = data.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let duplicate: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM permissions
                               WHERE path = ?1 AND actor = ?2 AND uuid != ?3)",
                params![data.path, data.actor, data.uuid.to_string()],
                |row| row.get(0),
            )?;
            if duplicate {
                return Err(StoreError::DuplicatePermission {
                    path: data.path.clone(),
                    actor: data.actor.clone(),
                });
            }

            tx.execute(
                "INSERT INTO permissions (uuid, path, actor, operations) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(uuid) DO UPDATE SET
                    path = excluded.path,
                    actor = excluded.actor,
                    operations = excluded.operations",
                params![
                    data.uuid.to_string(),
                    data.path,
                    data.actor,
                    data.operations.bits() as i64,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_permission(&self, uuid: &PermissionId) -> Result<Option<PermissionData>> {
        let uuid = uuid.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT uuid, path, actor, operations FROM permissions WHERE uuid = ?1",
                params![uuid],
                row_to_permission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_by_path_and_actor(
        &self,
        path: &str,
        actor: &str,
    ) -> Result<Option<PermissionData>> {
        let (path, actor) = (path.to_string(), actor.to_string());
        self.run(move |conn| {
            conn.query_row(
                "SELECT uuid, path, actor, operations FROM permissions
                 WHERE path = ?1 AND actor = ?2",
                params![path, actor],
                row_to_permission,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_by_path(&self, path: &str) -> Result<Vec<PermissionData>> {
        let path = path.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT uuid, path, actor, operations FROM permissions
                 WHERE path = ?1 ORDER BY actor",
            )?;
            let rows = stmt
                .query_map(params![path], row_to_permission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn find_by_paths_and_actor(
        &self,
        paths: &[String],
        actor: &str,
    ) -> Result<Vec<PermissionData>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec![actor.to_string()];
        args.extend(paths.iter().cloned());
        self.run(move |conn| {
            let sql = format!(
                "SELECT uuid, path, actor, operations FROM permissions
                 WHERE actor = ?1 AND path IN ({})",
                placeholders(2, args.len() - 1)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), row_to_permission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn find_all_paths_by_actor(&self, actor: &str) -> Result<Vec<String>> {
        let actor = actor.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT path FROM permissions WHERE actor = ?1 ORDER BY path",
            )?;
            let paths = stmt
                .query_map(params![actor], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(paths)
        })
        .await
    }

    async fn delete_permission(&self, uuid: &PermissionId) -> Result<bool> {
        let uuid = uuid.to_string();
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM permissions WHERE uuid = ?1", params![uuid])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn delete_by_path(&self, path: &str) -> Result<usize> {
        let path = path.to_string();
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM permissions WHERE path = ?1", params![path])?;
            Ok(deleted)
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key canaries
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl KeyCanaryStore for SqliteStore {
    async fn find_all_canaries(&self) -> Result<Vec<EncryptionKeyCanary>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, encrypted_value, nonce, salt FROM encryption_key_canaries
                 ORDER BY rowid",
            )?;
            let canaries = stmt
                .query_map([], row_to_canary)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(canaries)
        })
        .await
    }

    async fn save_canary(&self, canary: &EncryptionKeyCanary) -> Result<()> {
        let canary = canary.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO encryption_key_canaries (id, encrypted_value, nonce, salt)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    encrypted_value = excluded.encrypted_value,
                    nonce = excluded.nonce,
                    salt = excluded.salt",
                params![
                    canary.id.to_string(),
                    &canary.encrypted_canary_value[..],
                    &canary.nonce[..],
                    &canary.salt[..],
                ],
            )?;
            Ok(())
        })
        .await
    }
}
