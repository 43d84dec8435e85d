// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

pub mod memory;
pub mod scan;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryStore;
pub use scan::StoreScanner;
pub use sqlite::SqliteStore;
pub use traits::{BatchOp, BatchWriteResult, ColdStore, StorageError, StoreInfo};
