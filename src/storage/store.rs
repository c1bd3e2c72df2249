//! redb-based storage for the device record

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use udpu_shared::SubscriberRecord;

/// Client table: key = subscriber id, value = JSON [`ClientRow`]
const CLIENT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("client");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Client already exists: {0}")]
    AlreadyExists(String),

    #[error("Client not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Whether the record was written on the device's first boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootStatus {
    FirstBoot,
    EveryBoot,
}

/// Stored device record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRow {
    /// Subscriber id (primary key)
    pub name: String,
    pub client_frequency: String,
    pub boot_status: BootStatus,
    pub upstream_qos: String,
    pub downstream_qos: String,
    pub hostname: String,
    pub location: String,
    pub role: String,
}

impl ClientRow {
    /// Row for a device seen for the first time
    pub fn first_boot(record: &SubscriberRecord) -> Self {
        Self {
            name: record.subscriber_uid.clone(),
            client_frequency: String::new(),
            boot_status: BootStatus::FirstBoot,
            upstream_qos: record.upstream_qos.clone(),
            downstream_qos: record.downstream_qos.clone(),
            hostname: record.hostname.clone(),
            location: record.location.clone(),
            role: record.role.clone(),
        }
    }
}

/// Fields refreshed on every later boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFields {
    pub upstream_qos: String,
    pub downstream_qos: String,
    pub hostname: String,
    pub location: String,
    pub role: String,
    pub boot_status: BootStatus,
}

impl ClientFields {
    pub fn every_boot(record: &SubscriberRecord) -> Self {
        Self {
            upstream_qos: record.upstream_qos.clone(),
            downstream_qos: record.downstream_qos.clone(),
            hostname: record.hostname.clone(),
            location: record.location.clone(),
            role: record.role.clone(),
            boot_status: BootStatus::EveryBoot,
        }
    }

    fn apply(&self, row: &mut ClientRow) {
        row.upstream_qos = self.upstream_qos.clone();
        row.downstream_qos = self.downstream_qos.clone();
        row.hostname = self.hostname.clone();
        row.location = self.location.clone();
        row.role = self.role.clone();
        row.boot_status = self.boot_status;
    }
}

/// Key-value interface over device records
pub trait DeviceStore: Send + Sync {
    fn get(&self, name: &str) -> StorageResult<Option<ClientRow>>;

    /// Insert a new row; fails if the key already exists
    fn insert(&self, row: &ClientRow) -> StorageResult<()>;

    /// Overwrite the refreshable fields of an existing row
    fn update(&self, name: &str, fields: &ClientFields) -> StorageResult<()>;
}

/// Result of [`upsert_subscriber`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persist a registration: insert if absent, else field-level update
pub fn upsert_subscriber(
    store: &dyn DeviceStore,
    record: &SubscriberRecord,
) -> StorageResult<UpsertOutcome> {
    match store.get(&record.subscriber_uid)? {
        None => {
            store.insert(&ClientRow::first_boot(record))?;
            info!(subscriber_uid = %record.subscriber_uid, "Client record created");
            Ok(UpsertOutcome::Inserted)
        }
        Some(_) => {
            store.update(&record.subscriber_uid, &ClientFields::every_boot(record))?;
            info!(subscriber_uid = %record.subscriber_uid, "Client record updated");
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Device record storage
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CLIENT_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Number of stored rows
    #[cfg(test)]
    pub fn count(&self) -> StorageResult<usize> {
        use redb::ReadableTableMetadata;

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLIENT_TABLE)?;
        Ok(table.len()? as usize)
    }
}

impl DeviceStore for RedbStore {
    fn get(&self, name: &str) -> StorageResult<Option<ClientRow>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLIENT_TABLE)?;

        match table.get(name)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn insert(&self, row: &ClientRow) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CLIENT_TABLE)?;
            if table.get(row.name.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(row.name.clone()));
            }
            let value = serde_json::to_vec(row)?;
            table.insert(row.name.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn update(&self, name: &str, fields: &ClientFields) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CLIENT_TABLE)?;

            // Read first
            let bytes = {
                let value = table
                    .get(name)?
                    .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
                value.value().to_vec()
            };

            let mut row: ClientRow = serde_json::from_slice(&bytes)?;
            fields.apply(&mut row);
            let value = serde_json::to_vec(&row)?;
            table.insert(name, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
