// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential backing stores.
//!
//! Two capabilities with different lifetimes are kept apart on purpose:
//! [`SessionStorage`] holds the short-lived access credential, and
//! [`CookieJar`] holds the long-lived refresh credential that the transport
//! layer captures from `Set-Cookie` headers.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::{MemoryCookieJar, MemoryStorage};

/// Failure of a backing store. Not recoverable inside the auth subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode store {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Short-lived named string values (session-storage equivalent).
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Long-lived cookie-equivalent store.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, name: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, name: &str) -> Result<(), StorageError>;
}
