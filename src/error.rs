//! Stashエラー処理
//!
//! 呼び出し側が失敗の種類で分岐できるよう、エラーは種類ごとに別のバリアントにする。
//! - 設定エラー・引数エラー・未サポート操作は、バックエンドに触れる前に返る
//! - タイムアウトは「まだデータがない」ことを表し、他の失敗と区別できる
//! - バックエンドのメッセージは再解釈せずにそのまま転送する

use thiserror::Error;

/// Stash操作の結果型
pub type Result<T> = std::result::Result<T, StashError>;

/// Stashのエラー型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StashError {
    /// 構築パラメータが不正（hostの欠落など）。リトライしても成功しない
    #[error("configuration error: {0}")]
    Configuration(String),

    /// バックエンドに到達できない、または接続の確立に失敗した
    #[error("connection error: {0}")]
    Connection(String),

    /// ネゴシエートされたCapability Setに含まれない操作
    #[error("unsupported operation '{operation}': backend lacks capability ({capability})")]
    Unsupported {
        operation: &'static str,
        capability: String,
    },

    /// 呼び出し側が不正な引数を渡した（sideの値など）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// ブロッキング操作のタイムアウトが結果なしで経過した
    #[error("request timed out: {0}")]
    Timeout(String),

    /// バックエンドが報告したキー型に対応するラッパーがない
    #[error("unknown key type: {0}")]
    UnknownKeyType(String),

    /// その他のバックエンド由来のエラー（型不一致、プロトコルエラー等）
    #[error("backend error: {0}")]
    Backend(String),
}

impl StashError {
    /// タイムアウトかどうか
    pub fn is_timeout(&self) -> bool {
        matches!(self, StashError::Timeout(_))
    }

    /// 呼び出し側がリトライしてよい種類か
    ///
    /// 接続エラーとタイムアウトのみ。それ以外は同じ条件で再実行しても結果は変わらない。
    pub fn is_retryable(&self) -> bool {
        matches!(self, StashError::Connection(_) | StashError::Timeout(_))
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        StashError::InvalidArgument(message.into())
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        StashError::Backend(message.into())
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StashError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            StashError::Timeout(e.to_string())
        } else if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            StashError::Connection(e.to_string())
        } else {
            StashError::Backend(e.to_string())
        }
    }
}
