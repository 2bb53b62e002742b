//! # Supabase（PostgREST）ストレージ実装
//!
//! `POST {url}/rest/v1/{table}` で1行を追記する。
//! `reqwest::Client` は内部で接続プールを持つため、プロセスで1つを共有する。

use std::time::Duration;

use super::{StorageError, TableStore};
use crate::config::SupabaseConfig;

/// Supabase REST APIによる `TableStore` 実装。
pub struct SupabaseStore {
    client: reqwest::Client,
    /// プロジェクトURL（末尾の `/` は除去済み）
    base_url: String,
    /// anonキー（`apikey` ヘッダとBearerトークンの両方に使う）
    anon_key: String,
    /// 重複抑止に使う一意制約カラム
    on_conflict: Option<String>,
}

impl SupabaseStore {
    /// 設定からクライアントを構築する。
    pub fn new(config: &SupabaseConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            on_conflict: config.on_conflict.clone(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        match &self.on_conflict {
            Some(column) => format!("{}/rest/v1/{table}?on_conflict={column}", self.base_url),
            None => format!("{}/rest/v1/{table}", self.base_url),
        }
    }

    fn prefer_header(&self) -> &'static str {
        if self.on_conflict.is_some() {
            "return=minimal,resolution=ignore-duplicates"
        } else {
            "return=minimal"
        }
    }
}

#[async_trait::async_trait]
impl TableStore for SupabaseStore {
    async fn insert(&self, table: &str, record: serde_json::Value) -> Result<(), StorageError> {
        let body =
            serde_json::to_vec(&record).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let resp = self
            .client
            .post(self.endpoint(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("Prefer", self.prefer_header())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout
                } else {
                    StorageError::Unavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(error = %e, "Supabaseのエラーレスポンス本文の読み取りに失敗");
                    String::new()
                }
            };
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(table = table, status = status.as_u16(), "Supabaseへの書き込み完了");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;

    use super::*;

    /// 受信したリクエスト（クエリ, ヘッダ, 本文）
    type Captured = Arc<Mutex<Vec<(Option<String>, HeaderMap, serde_json::Value)>>>;

    /// PostgRESTを模したモックサーバーを起動する。
    async fn start_mock_postgrest(status: StatusCode, delay: Duration) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let sink = captured.clone();
        let app = axum::Router::new().route(
            "/rest/v1/listings",
            post(
                move |uri: axum::http::Uri,
                      headers: HeaderMap,
                      axum::Json(body): axum::Json<serde_json::Value>| {
                    let sink = sink.clone();
                    async move {
                        tokio::time::sleep(delay).await;
                        sink.lock()
                            .unwrap()
                            .push((uri.query().map(str::to_string), headers, body));
                        (status, "duplicate key value violates unique constraint")
                    }
                },
            ),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (format!("http://127.0.0.1:{port}/"), captured)
    }

    fn config(url: String, on_conflict: Option<&str>, timeout_secs: u64) -> SupabaseConfig {
        SupabaseConfig {
            url,
            anon_key: "anon-test-key".to_string(),
            on_conflict: on_conflict.map(str::to_string),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn test_insert_sends_postgrest_request() {
        let (url, captured) = start_mock_postgrest(StatusCode::CREATED, Duration::ZERO).await;
        let store = SupabaseStore::new(&config(url, None, 5)).unwrap();

        store
            .insert("listings", serde_json::json!({"name": "Drone #1", "verified": true}))
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (query, headers, body) = &captured[0];
        assert!(query.is_none());
        assert_eq!(headers["apikey"], "anon-test-key");
        assert_eq!(headers["authorization"], "Bearer anon-test-key");
        assert_eq!(headers["prefer"], "return=minimal");
        assert_eq!(body["name"], "Drone #1");
    }

    #[tokio::test]
    async fn test_insert_with_on_conflict_ignores_duplicates() {
        let (url, captured) = start_mock_postgrest(StatusCode::CREATED, Duration::ZERO).await;
        let store = SupabaseStore::new(&config(url, Some("idempotency_key"), 5)).unwrap();

        store
            .insert("listings", serde_json::json!({"idempotency_key": "ab"}))
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        let (query, headers, _) = &captured[0];
        assert_eq!(query.as_deref(), Some("on_conflict=idempotency_key"));
        assert_eq!(
            headers["prefer"],
            "return=minimal,resolution=ignore-duplicates"
        );
    }

    #[tokio::test]
    async fn test_rejected_insert_carries_status() {
        let (url, _) = start_mock_postgrest(StatusCode::CONFLICT, Duration::ZERO).await;
        let store = SupabaseStore::new(&config(url, None, 5)).unwrap();

        let err = store
            .insert("listings", serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            StorageError::Rejected { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("duplicate key"));
            }
            other => panic!("Rejectedを期待: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let (url, _) = start_mock_postgrest(StatusCode::CREATED, Duration::from_secs(3)).await;
        let store = SupabaseStore::new(&config(url, None, 1)).unwrap();

        let err = store
            .insert("listings", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout), "{err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // バインド直後に解放したポートには誰も待ち受けていない
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let store =
            SupabaseStore::new(&config(format!("http://127.0.0.1:{port}"), None, 5)).unwrap();
        let err = store
            .insert("listings", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)), "{err:?}");
        assert_eq!(err.class(), "unavailable");
    }
}
