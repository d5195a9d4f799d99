#![forbid(unsafe_code)]

pub mod local;
pub mod remote;
pub mod repository;
pub mod sqlite;

pub use local::LocalStorage;
pub use remote::{InMemoryRemoteStore, RemoteError, RemoteProgressStore};
pub use repository::{InMemoryRepository, KeyValueStore, Storage, StorageError};
