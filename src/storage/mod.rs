//! Local persistent device record
//!
//! A single `client` table keyed by subscriber id mirrors the metadata the
//! control plane assigned to this device.

mod store;

pub use store::{upsert_subscriber, RedbStore, StorageError};
