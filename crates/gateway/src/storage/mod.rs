//! # 出品レコードのストレージ
//!
//! テーブル指向の追記操作 `insert(table, record)` を抽象化する。
//! 本番はSupabase（PostgREST）、開発・テストはインメモリ実装を使う。
//! Supabase実装は `supabase` サブモジュールを参照。

pub mod memory;
#[cfg(feature = "vendor-supabase")]
pub mod supabase;

use std::sync::Arc;

pub use memory::MemoryStore;
#[cfg(feature = "vendor-supabase")]
pub use supabase::SupabaseStore;

use crate::config::{GatewayConfig, StorageBackend};

/// ストレージ操作のエラー。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// タイムアウト（書き込みの成否は不明）
    #[error("ストレージへの書き込みがタイムアウトしました")]
    Timeout,
    /// 接続失敗等でストレージに到達できない
    #[error("ストレージに接続できません: {0}")]
    Unavailable(String),
    /// ストレージがリクエストを拒否した（制約違反、認証失敗等）
    #[error("ストレージが書き込みを拒否しました: HTTP {status} - {message}")]
    Rejected {
        /// HTTPステータスコード
        status: u16,
        /// 上流のレスポンス本文
        message: String,
    },
    /// レコードのシリアライズに失敗
    #[error("レコードのシリアライズに失敗: {0}")]
    Serialization(String),
}

impl StorageError {
    /// クライアントに返してよい分類文字列。
    pub fn class(&self) -> String {
        match self {
            StorageError::Timeout => "timeout".to_string(),
            StorageError::Unavailable(_) => "unavailable".to_string(),
            StorageError::Rejected { status, .. } => format!("rejected (HTTP {status})"),
            StorageError::Serialization(_) => "serialization".to_string(),
        }
    }
}

/// テーブル指向ストレージの抽象インターフェース。
///
/// 複数リクエストから並行に呼ばれるため `Send + Sync` を要求する。
/// 実装は接続プール等を内部に持ち、グローバル状態に依存しない。
#[async_trait::async_trait]
pub trait TableStore: Send + Sync {
    /// `table` に1行追記する。
    ///
    /// 失敗時に再試行はしない（呼び出し側に分類済みエラーを返す）。
    async fn insert(&self, table: &str, record: serde_json::Value) -> Result<(), StorageError>;
}

/// 設定に従ってストレージ実装を構築する。
pub fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn TableStore>> {
    match &config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("MemoryStoreで起動します。出品はプロセス終了時に失われます（開発環境用）");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "vendor-supabase")]
        StorageBackend::Supabase(supabase) => {
            tracing::info!(
                supabase_url = %supabase.url,
                on_conflict = ?supabase.on_conflict,
                "SupabaseStoreで起動します"
            );
            Ok(Arc::new(SupabaseStore::new(supabase)?))
        }
        #[cfg(not(feature = "vendor-supabase"))]
        StorageBackend::Supabase(_) => anyhow::bail!(
            "STORAGE_BACKEND=supabase ですが vendor-supabase featureが無効です"
        ),
    }
}
