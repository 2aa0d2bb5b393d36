//! Connection Manager
//!
//! バックエンド接続のライフサイクル（取得 → 実行 → 解放）を管理する。
//! 解放は `ScopedConnection` の `Drop` で行うため、正常終了・エラー・パニックの
//! いずれの経路でも必ず実行される。
//! 名前空間が設定されている場合は、このスコープの内側で透過的に適用する。

use crate::command::Command;
use crate::error::Result;
use crate::reply::Reply;
use std::sync::Arc;
use tracing::debug;

/// 1つのバックエンドセッション
pub trait Connection: Send {
    /// コマンドを送信して生の応答を受け取る
    fn execute(&mut self, command: &Command) -> Result<Reply>;

    /// サーバー情報（バージョン問い合わせ用）
    fn server_info(&mut self) -> Result<String>;

    /// セッションを終了する
    fn quit(&mut self) -> Result<()>;
}

/// 接続を生成するバックエンド側の協力者
///
/// 接続の確立に失敗した場合は `StashError::Connection` を返すこと。
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// キーに名前空間プレフィックスを付与する接続ラッパー
pub struct Namespaced {
    inner: Box<dyn Connection>,
    namespace: String,
}

impl Namespaced {
    pub fn new(inner: Box<dyn Connection>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    /// 応答中のキー名からプレフィックスを取り除く
    fn strip(&self, reply: Reply) -> Reply {
        let prefix = format!("{}:", self.namespace);
        match reply {
            Reply::Array(items) => Reply::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Reply::Data(s) => match s.strip_prefix(&prefix) {
                            Some(rest) => Reply::Data(rest.to_string()),
                            None => Reply::Data(s),
                        },
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

impl Connection for Namespaced {
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let ns = &self.namespace;
        let prefixed = command.clone().map_keys(|k| format!("{}:{}", ns, k));
        let reply = self.inner.execute(&prefixed)?;
        if command.operation().returns_keys() {
            Ok(self.strip(reply))
        } else {
            Ok(reply)
        }
    }

    fn server_info(&mut self) -> Result<String> {
        self.inner.server_info()
    }

    fn quit(&mut self) -> Result<()> {
        self.inner.quit()
    }
}

/// スコープを抜けるときに必ず接続を解放するガード
struct ScopedConnection {
    conn: Box<dyn Connection>,
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        // 解放失敗は呼び出し元の結果を上書きしない
        if let Err(e) = self.conn.quit() {
            debug!(error = %e, "ignoring failure while releasing connection");
        }
    }
}

/// 操作ごとに接続を取得・解放するマネージャー
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    namespace: Option<String>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, namespace: Option<String>) -> Self {
        Self {
            connector,
            namespace,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// 接続を取得して `f` に渡し、終了後に必ず解放する
    ///
    /// 接続の確立に失敗した場合、`f` は呼ばれない。
    /// `f` が失敗した場合も、解放が済んでからエラーを返す。
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T>,
    {
        let conn = self.connector.connect()?;
        let conn: Box<dyn Connection> = match &self.namespace {
            Some(ns) => Box::new(Namespaced::new(conn, ns.clone())),
            None => conn,
        };
        let mut scoped = ScopedConnection { conn };
        f(scoped.conn.as_mut())
    }
}
