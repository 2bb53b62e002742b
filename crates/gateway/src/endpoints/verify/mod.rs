//! # POST /verify エンドポイント
//!
//! ## モジュール構成
//! - `handler`: リクエストの受付・ネットワーク解決・署名検証・出品登録

mod handler;

pub use handler::handle_verify;
