use chrono::Utc;
use haven_core::Incident;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

pub const STORE_SCHEMA_VERSION: i64 = 1;

/// Key the whole incident collection is stored under.
pub const DEFAULT_NAMESPACE: &str = "incidents";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("no incident with id {id}")]
    IncidentNotFound { id: String },
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// Durable process-local store for the incident collection.
///
/// The collection is one namespaced cell holding the serialized incident
/// array; `save_all` replaces it wholesale, while `upsert_incident` and
/// `update_incident` re-read the latest snapshot and patch only the target
/// record inside a single transaction, so each logical mutation lands as
/// one atomic unit.
pub struct IncidentStore {
    conn: Connection,
    namespace: String,
}

impl IncidentStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_namespace(path, DEFAULT_NAMESPACE)
    }

    pub fn open_with_namespace(
        path: impl AsRef<Path>,
        namespace: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            namespace: namespace.into(),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > STORE_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: STORE_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_incident_collections.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    /// Returns the full collection. An absent cell or a corrupt payload
    /// yields an empty collection; corruption never propagates to callers.
    pub fn load_all(&self) -> Result<Vec<Incident>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM incident_collections WHERE namespace = ?1",
                [&self.namespace],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };

        Ok(serde_json::from_str(&payload).unwrap_or_default())
    }

    /// Atomically replaces the persisted collection with the given snapshot.
    pub fn save_all(&mut self, incidents: &[Incident]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_collection(&tx, &self.namespace, incidents)?;
        tx.commit()?;
        Ok(())
    }

    /// Replaces the record matching the incident's id, or appends it when
    /// absent. The latest snapshot is re-read inside the same transaction,
    /// so concurrent writers cannot be overwritten wholesale.
    pub fn upsert_incident(&mut self, incident: &Incident) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let mut incidents = read_collection(&tx, &self.namespace)?;

        match incidents.iter_mut().find(|stored| stored.id == incident.id) {
            Some(stored) => *stored = incident.clone(),
            None => incidents.push(incident.clone()),
        }

        write_collection(&tx, &self.namespace, &incidents)?;
        tx.commit()?;
        Ok(())
    }

    /// Applies a patch to the stored record with the given id and returns
    /// the patched incident. Fails when the incident does not exist.
    pub fn update_incident<F>(&mut self, id: &str, patch: F) -> Result<Incident, StoreError>
    where
        F: FnOnce(&mut Incident),
    {
        let tx = self.conn.transaction()?;
        let mut incidents = read_collection(&tx, &self.namespace)?;

        let target = incidents
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or_else(|| StoreError::IncidentNotFound { id: id.to_string() })?;
        patch(target);
        let patched = target.clone();

        write_collection(&tx, &self.namespace, &incidents)?;
        tx.commit()?;
        Ok(patched)
    }

    pub fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|incident| incident.id == id))
    }

    pub fn incident_count(&self) -> Result<usize, StoreError> {
        Ok(self.load_all()?.len())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StoreError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

fn read_collection(conn: &Connection, namespace: &str) -> Result<Vec<Incident>, StoreError> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload_json FROM incident_collections WHERE namespace = ?1",
            [namespace],
            |row| row.get(0),
        )
        .optional()?;

    let Some(payload) = payload else {
        return Ok(Vec::new());
    };

    // Corrupt payloads recover as an empty collection rather than failing
    // the caller's mutation.
    Ok(serde_json::from_str(&payload).unwrap_or_default())
}

fn write_collection(
    conn: &Connection,
    namespace: &str,
    incidents: &[Incident],
) -> Result<(), StoreError> {
    let payload = serde_json::to_string(incidents)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;

    conn.execute(
        "
        INSERT INTO incident_collections (namespace, payload_json, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(namespace) DO UPDATE SET
            payload_json=excluded.payload_json,
            updated_at=excluded.updated_at
        ",
        params![namespace, payload, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
