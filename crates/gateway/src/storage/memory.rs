//! # インメモリストレージ
//!
//! 開発環境（`STORAGE_BACKEND=memory`）とテストで使う `TableStore` 実装。

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{StorageError, TableStore};

/// テーブル名 → 追記順の行一覧。
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl MemoryStore {
    /// 空のストアを構築する。
    pub fn new() -> Self {
        Self::default()
    }

    /// `table` の全行を追記順に返す。
    pub async fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// `table` の行数。
    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl TableStore for MemoryStore {
    async fn insert(&self, table: &str, record: serde_json::Value) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record);
        Ok(())
    }
}
