//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に1回だけ読み込み、以降は変更しない。

use std::fmt;

use dronox_crypto::VerifierRegistry;

use crate::submit::{ListingLimits, ListingSubmitter};

/// Gatewayの共有状態。
///
/// リクエスト間で共有するのは不変データと `TableStore`（内部で接続プールを持つ）のみ。
pub struct GatewayState {
    /// GET / で返すサービス名
    pub service_name: String,
    /// チェーン別の署名検証方式
    pub registry: VerifierRegistry,
    /// 出品登録
    pub submitter: ListingSubmitter,
}

/// 出品の保存先。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Supabase（PostgREST）
    Supabase(SupabaseConfig),
    /// プロセス内メモリ（開発環境用）
    Memory,
}

/// Supabase接続設定。
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// プロジェクトURL
    pub url: String,
    /// anonキー
    pub anon_key: String,
    /// 重複抑止に使う一意制約カラム（未設定なら通常のINSERT）
    pub on_conflict: Option<String>,
    /// 1回の書き込みのタイムアウト（秒）
    pub timeout_secs: u64,
}

// anonキーはログに出さない
impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("on_conflict", &self.on_conflict)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// 環境変数から読み込んだGateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// バインドするホスト
    pub host: String,
    /// バインドするポート
    pub port: u16,
    /// GET / で返すサービス名
    pub service_name: String,
    /// 出品の保存先
    pub storage_backend: StorageBackend,
    /// 出品を追記するテーブル名
    pub listings_table: String,
    /// CORSで許可するオリジン（空または `*` を含む場合は全オリジン）
    pub cors_allowed_origins: Vec<String>,
    /// 出品情報の上限
    pub listing_limits: ListingLimits,
}

impl GatewayConfig {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から読み込む。空文字列は未設定として扱う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(var("PORT"), "PORT", 5000u16)?;
        let service_name =
            var("SERVICE_NAME").unwrap_or_else(|| "Dronox Signature Verifier".to_string());

        let timeout_secs = parse_or(var("STORAGE_TIMEOUT_SECS"), "STORAGE_TIMEOUT_SECS", 10u64)?;
        if timeout_secs == 0 {
            anyhow::bail!("STORAGE_TIMEOUT_SECSは1以上である必要があります");
        }

        let backend = var("STORAGE_BACKEND").unwrap_or_else(|| "supabase".to_string());
        let storage_backend = match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "supabase" => {
                let url = var("SUPABASE_URL").ok_or_else(|| {
                    anyhow::anyhow!("STORAGE_BACKEND=supabase にはSUPABASE_URLが必要です")
                })?;
                let anon_key = var("SUPABASE_ANON_KEY").ok_or_else(|| {
                    anyhow::anyhow!("STORAGE_BACKEND=supabase にはSUPABASE_ANON_KEYが必要です")
                })?;
                StorageBackend::Supabase(SupabaseConfig {
                    url,
                    anon_key,
                    on_conflict: var("SUPABASE_ON_CONFLICT"),
                    timeout_secs,
                })
            }
            other => anyhow::bail!("未知のSTORAGE_BACKEND: {other}（supabase / memory）"),
        };

        let listings_table = var("LISTINGS_TABLE").unwrap_or_else(|| "listings".to_string());

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        let defaults = ListingLimits::default();
        let listing_limits = ListingLimits {
            max_name_len: parse_or(var("MAX_NAME_LEN"), "MAX_NAME_LEN", defaults.max_name_len)?,
            max_image_url_len: parse_or(
                var("MAX_IMAGE_URL_LEN"),
                "MAX_IMAGE_URL_LEN",
                defaults.max_image_url_len,
            )?,
        };

        Ok(Self {
            host,
            port,
            service_name,
            storage_backend,
            listings_table,
            cors_allowed_origins,
            listing_limits,
        })
    }

    /// 行に重複排除キーを書き込むか（Supabaseに一意制約カラムを設定した場合のみ）。
    pub fn writes_idempotency_key(&self) -> bool {
        matches!(
            &self.storage_backend,
            StorageBackend::Supabase(SupabaseConfig { on_conflict: Some(_), .. })
        )
    }

    /// `host:port` 形式のバインドアドレス。
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}の値が不正です ({v}): {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_memory_backend() {
        let config = load(&[("STORAGE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.service_name, "Dronox Signature Verifier");
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.listings_table, "listings");
        assert_eq!(config.cors_allowed_origins, vec!["*".to_string()]);
        assert_eq!(config.listing_limits.max_name_len, 200);
        assert_eq!(config.listing_limits.max_image_url_len, 2048);
        assert!(!config.writes_idempotency_key());
    }

    #[test]
    fn test_supabase_backend_requires_credentials() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));

        let err = load(&[("SUPABASE_URL", "https://x.supabase.co")]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));
    }

    #[test]
    fn test_supabase_backend_reads_all_fields() {
        let config = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_ON_CONFLICT", "idempotency_key"),
            ("STORAGE_TIMEOUT_SECS", "3"),
            ("PORT", "8080"),
            ("CORS_ALLOWED_ORIGINS", "https://dronox.app, https://admin.dronox.app"),
        ])
        .unwrap();

        match &config.storage_backend {
            StorageBackend::Supabase(s) => {
                assert_eq!(s.url, "https://x.supabase.co");
                assert_eq!(s.on_conflict.as_deref(), Some("idempotency_key"));
                assert_eq!(s.timeout_secs, 3);
            }
            other => panic!("Supabaseを期待: {other:?}"),
        }
        assert!(config.writes_idempotency_key());
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://dronox.app", "https://admin.dronox.app"]
        );
    }

    #[test]
    fn test_plain_insert_without_conflict_column() {
        let config = load(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();
        assert!(!config.writes_idempotency_key());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[("STORAGE_BACKEND", "memory"), ("PORT", "http")]).is_err());
        assert!(load(&[("STORAGE_BACKEND", "memory"), ("STORAGE_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("STORAGE_BACKEND", "s3")]).is_err());
    }

    #[test]
    fn test_debug_redacts_anon_key() {
        let config = SupabaseConfig {
            url: "https://x.supabase.co".into(),
            anon_key: "super-secret".into(),
            on_conflict: None,
            timeout_secs: 10,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
