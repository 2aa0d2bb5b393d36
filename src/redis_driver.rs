//! Redisバックエンド
//!
//! このモジュールは `redis-backend` feature でコンパイルされます。
//! 非同期クライアントを専用の current-thread ランタイム上で `block_on` して同期APIとして使う。
//! ワーカースレッドは起動しない。

use crate::command::Command;
use crate::config::StashConfig;
use crate::connection::{Connection, Connector};
use crate::error::{Result, StashError};
use crate::reply::Reply;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Redisへの接続を生成するコネクタ
pub struct RedisConnector {
    client: Client,
    runtime: Arc<Runtime>,
    connect_timeout: Option<Duration>,
}

impl RedisConnector {
    pub fn new(config: &StashConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::open(config.connection_url().as_str()).map_err(|e| {
            StashError::Configuration(format!("invalid connection parameters: {}", e))
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StashError::Connection(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
            connect_timeout: config.connect_timeout(),
        })
    }
}

/// 接続確立時のエラーは種類を問わず接続エラーとして扱う（認証失敗を含む）
fn connection_error(e: redis::RedisError) -> StashError {
    StashError::Connection(e.to_string())
}

impl Connector for RedisConnector {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self.runtime.block_on(async {
            let connecting = self.client.get_multiplexed_async_connection();
            match self.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, connecting)
                    .await
                    .map_err(|_| {
                        StashError::Connection(format!("connect timed out after {:?}", limit))
                    })?
                    .map_err(connection_error),
                None => connecting.await.map_err(connection_error),
            }
        })?;

        Ok(Box::new(RedisConnection {
            conn,
            runtime: self.runtime.clone(),
        }))
    }
}

/// Redisとの1セッション
struct RedisConnection {
    conn: MultiplexedConnection,
    runtime: Arc<Runtime>,
}

impl Connection for RedisConnection {
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        let mut cmd = redis::cmd(command.name());
        for arg in command.args() {
            cmd.arg(arg.as_str());
        }
        let value: redis::Value = self.runtime.block_on(cmd.query_async(&mut self.conn))?;
        to_reply(value)
    }

    fn server_info(&mut self) -> Result<String> {
        let info: String = self
            .runtime
            .block_on(redis::cmd("INFO").arg("server").query_async(&mut self.conn))?;
        Ok(info)
    }

    fn quit(&mut self) -> Result<()> {
        let _: redis::Value = self
            .runtime
            .block_on(redis::cmd("QUIT").query_async(&mut self.conn))?;
        Ok(())
    }
}

/// redis::Value → Reply
fn to_reply(value: redis::Value) -> Result<Reply> {
    let reply = match value {
        redis::Value::Nil => Reply::Nil,
        redis::Value::Int(i) => Reply::Int(i),
        redis::Value::BulkString(bytes) => {
            Reply::Data(String::from_utf8_lossy(&bytes).into_owned())
        }
        redis::Value::SimpleString(s) => Reply::Status(s),
        redis::Value::Okay => Reply::Okay,
        redis::Value::Array(items) | redis::Value::Set(items) => Reply::Array(
            items
                .into_iter()
                .map(to_reply)
                .collect::<Result<Vec<_>>>()?,
        ),
        redis::Value::Map(pairs) => {
            let mut flat = Vec::with_capacity(pairs.len() * 2);
            for (k, v) in pairs {
                flat.push(to_reply(k)?);
                flat.push(to_reply(v)?);
            }
            Reply::Array(flat)
        }
        redis::Value::Double(f) => Reply::Double(f),
        redis::Value::Boolean(b) => Reply::Int(i64::from(b)),
        other => {
            return Err(StashError::backend(format!(
                "unsupported reply: {:?}",
                other
            )))
        }
    };
    Ok(reply)
}
