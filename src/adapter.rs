//! Adapter（ディスパッチエンジン）
//!
//! 抽象操作を受け取り、Capability Setを確認し、Connection Manager経由で
//! バックエンドのコマンドを実行し、応答を戻り値型に変換する。
//! 公開操作はすべて `Adapter::run` の一本の経路を通る。

use crate::capability::CapabilitySet;
use crate::command::{Command, Operation};
use crate::connection::{ConnectionManager, Connector};
use crate::error::{Result, StashError};
use crate::reply::{FromReply, Reply};
use crate::value::{
    IntoSide, KeyKind, StashHash, StashList, StashSet, StashSortedSet, StashString, StashValue,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(feature = "redis-backend")]
use crate::config::StashConfig;
#[cfg(feature = "redis-backend")]
use crate::redis_driver::RedisConnector;

/// バックエンドへの型付きファサード
///
/// 操作ごとに接続を取得・解放するため、複数スレッドから共有してよい。
#[derive(Clone)]
pub struct Adapter {
    manager: ConnectionManager,
    capabilities: CapabilitySet,
}

impl Adapter {
    /// 設定からRedisに接続する
    ///
    /// 設定が不正なら `Configuration` エラー。Capability Setはここで一度だけ計算する。
    #[cfg(feature = "redis-backend")]
    pub fn connect(config: StashConfig) -> Result<Self> {
        config.validate()?;
        let disabled = config.disabled()?;
        let connector = RedisConnector::new(&config)?;
        let adapter = Self::with_connector(Arc::new(connector), config.namespace.clone());
        Ok(adapter.disable(disabled))
    }

    /// 任意のコネクタ上にアダプタを構築する
    ///
    /// バージョン問い合わせに失敗した場合（接続できない場合を含む）はベースラインに縮退する。
    pub fn with_connector(connector: Arc<dyn Connector>, namespace: Option<String>) -> Self {
        let manager = ConnectionManager::new(connector, namespace);
        let capabilities = manager
            .with_connection(|conn| Ok(CapabilitySet::negotiate(conn)))
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not reach backend for capability probe, using baseline");
                CapabilitySet::baseline()
            });
        Self {
            manager,
            capabilities,
        }
    }

    /// Capability Setを指定して構築する（問い合わせなし）
    pub fn with_capabilities(
        connector: Arc<dyn Connector>,
        namespace: Option<String>,
        capabilities: CapabilitySet,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(connector, namespace),
            capabilities,
        }
    }

    /// 指定した操作を無効化した新しいアダプタを返す
    pub fn disable<I>(self, operations: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        Self {
            capabilities: self.capabilities.without(operations),
            manager: self.manager,
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.capabilities.supports(operation)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.manager.namespace()
    }

    // ========================================
    // ディスパッチ
    // ========================================

    /// 1コマンドを実行し、接続スコープ内で応答を変換する
    fn run<T, F>(&self, command: Command, translate: F) -> Result<T>
    where
        F: FnOnce(Reply) -> Result<T>,
    {
        let operation = command.operation();
        self.capabilities.require(operation)?;
        debug!(
            operation = operation.name(),
            command = command.name(),
            namespaced = self.manager.namespace().is_some(),
            "dispatch"
        );
        self.manager.with_connection(|conn| {
            let reply = conn.execute(&command)?;
            translate(reply)
        })
    }

    fn query<T: FromReply>(&self, command: Command) -> Result<T> {
        self.run(command, T::from_reply)
    }

    // ========================================
    // 基本操作
    // ========================================

    pub fn set(&self, key: &str, value: impl ToString) -> Result<()> {
        self.query(Command::new(Operation::Set).key(key).arg(value))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(Command::new(Operation::Get).key(key))
    }

    /// キーを削除する。削除されたら true
    pub fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.query(Command::new(Operation::Delete).key(key))?;
        Ok(removed > 0)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.query(Command::new(Operation::Exists).key(key))
    }

    /// キーの実行時型
    ///
    /// 対応するラッパーがない型は `UnknownKeyType` になる。
    pub fn type_of(&self, key: &str) -> Result<KeyKind> {
        let kind: String = self.query(Command::new(Operation::Type).key(key))?;
        KeyKind::parse(&kind)
    }

    /// 有効期限を設定する
    ///
    /// 1秒未満の端数は切り上げる。ゼロはキーを即座に消すため `InvalidArgument`。
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            return Err(StashError::invalid_argument("expire requires a non-zero ttl"));
        }
        self.query(Command::new(Operation::Expire).key(key).arg(whole_seconds(ttl)))
    }

    /// 残り秒数。期限なしは -1、キーなしは -2
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::Ttl).key(key))
    }

    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.query(Command::new(Operation::Keys).key(pattern))
    }

    /// 値を取得して削除する（Redis 6.2以降）
    pub fn get_delete(&self, key: &str) -> Result<Option<String>> {
        self.query(Command::new(Operation::GetDelete).key(key))
    }

    pub fn increment(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::Increment).key(key))
    }

    pub fn decrement(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::Decrement).key(key))
    }

    pub fn increment_by(&self, key: &str, by: i64) -> Result<i64> {
        self.query(Command::new(Operation::IncrementBy).key(key).arg(by))
    }

    pub fn multi_get<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Err(StashError::invalid_argument("multi_get requires at least one key"));
        }
        let command = keys
            .iter()
            .fold(Command::new(Operation::MultiGet), |cmd, k| cmd.key(k.as_ref()));
        self.query(command)
    }

    pub fn multi_set<K, V>(&self, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: ToString,
    {
        if pairs.is_empty() {
            return Err(StashError::invalid_argument("multi_set requires at least one pair"));
        }
        let command = pairs
            .iter()
            .fold(Command::new(Operation::MultiSet), |cmd, (k, v)| {
                cmd.key(k.as_ref()).arg(v.to_string())
            });
        self.query(command)
    }

    // ========================================
    // ハッシュ操作
    // ========================================

    pub fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.query(Command::new(Operation::HashGet).key(key).arg(field))
    }

    /// フィールドを設定する。新規フィールドなら true
    pub fn hash_set(&self, key: &str, field: &str, value: impl ToString) -> Result<bool> {
        self.query(Command::new(Operation::HashSet).key(key).arg(field).arg(value))
    }

    pub fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        self.query(Command::new(Operation::HashDelete).key(key).arg(field))
    }

    pub fn hash_length(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::HashLength).key(key))
    }

    pub fn hash_multi_get<F: AsRef<str>>(
        &self,
        key: &str,
        fields: &[F],
    ) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Err(StashError::invalid_argument(
                "hash_multi_get requires at least one field",
            ));
        }
        let command = fields
            .iter()
            .fold(Command::new(Operation::HashMultiGet).key(key), |cmd, f| {
                cmd.arg(f.as_ref())
            });
        self.query(command)
    }

    /// 全フィールドと値の組
    pub fn hash_value(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.run(Command::new(Operation::HashValue).key(key), Reply::into_pairs)
    }

    pub fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        self.query(Command::new(Operation::HashKeys).key(key))
    }

    pub fn hash_values(&self, key: &str) -> Result<Vec<String>> {
        self.query(Command::new(Operation::HashValues).key(key))
    }

    pub fn hash_exists(&self, key: &str, field: &str) -> Result<bool> {
        self.query(Command::new(Operation::HashExists).key(key).arg(field))
    }

    pub fn hash_increment_by(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        self.query(
            Command::new(Operation::HashIncrementBy)
                .key(key)
                .arg(field)
                .arg(by),
        )
    }

    // ========================================
    // リスト操作
    // ========================================

    /// リストの端に要素を追加し、追加後の長さを返す
    ///
    /// `side` が left/right 以外なら、接続を取得する前に `InvalidArgument` で失敗する。
    pub fn list_push(&self, key: &str, value: impl ToString, side: impl IntoSide) -> Result<i64> {
        let side = side.into_side()?;
        self.query(Command::new(side.push_operation()).key(key).arg(value))
    }

    pub fn list_pop(&self, key: &str, side: impl IntoSide) -> Result<Option<String>> {
        let side = side.into_side()?;
        self.query(Command::new(side.pop_operation()).key(key))
    }

    /// 要素が来るまでブロックして取り出す
    ///
    /// `timeout` が `None` または `Duration::ZERO` の場合は無期限に待つ。
    /// 1秒未満の端数は切り上げる（バックエンドのタイムアウト単位は秒）。
    /// タイムアウトが経過して要素がなければ `Timeout` エラー。
    pub fn list_blocking_pop(
        &self,
        key: &str,
        side: impl IntoSide,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let side = side.into_side()?;
        let seconds = timeout_seconds(timeout);
        let command = Command::new(side.blocking_pop_operation())
            .key(key)
            .arg(seconds);
        self.run(command, Reply::into_popped)?.ok_or_else(|| {
            if seconds == 0 {
                StashError::Timeout(format!(
                    "no element on '{}' and backend gave up on an unbounded wait",
                    key
                ))
            } else {
                StashError::Timeout(format!("no element on '{}' within {}s", key, seconds))
            }
        })
    }

    pub fn list_length(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::ListLength).key(key))
    }

    /// `start`〜`stop`（両端含む、負数は末尾から）の要素
    pub fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(
            Command::new(Operation::ListRange)
                .key(key)
                .arg(start)
                .arg(stop),
        )
    }

    pub fn list_index(&self, key: &str, index: i64) -> Result<Option<String>> {
        self.query(Command::new(Operation::ListIndex).key(key).arg(index))
    }

    pub fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.query(Command::new(Operation::ListTrim).key(key).arg(start).arg(stop))
    }

    /// `value` に一致する要素を最大 `count` 個削除する（0なら全部）
    pub fn list_remove(&self, key: &str, count: i64, value: impl ToString) -> Result<i64> {
        self.query(
            Command::new(Operation::ListRemove)
                .key(key)
                .arg(count)
                .arg(value),
        )
    }

    /// 最初に一致する要素の位置（Redis 6.0.6以降）
    pub fn list_position(&self, key: &str, value: impl ToString) -> Result<Option<i64>> {
        self.query(Command::new(Operation::ListPosition).key(key).arg(value))
    }

    // ========================================
    // セット操作
    // ========================================

    pub fn set_add(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.query(Command::new(Operation::SetAdd).key(key).arg(member))
    }

    pub fn set_remove(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.query(Command::new(Operation::SetRemove).key(key).arg(member))
    }

    pub fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.query(Command::new(Operation::SetMembers).key(key))
    }

    pub fn set_is_member(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.query(Command::new(Operation::SetIsMember).key(key).arg(member))
    }

    pub fn set_cardinality(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::SetCardinality).key(key))
    }

    // ========================================
    // ソート済みセット操作
    // ========================================

    pub fn sorted_set_add(&self, key: &str, score: f64, member: impl ToString) -> Result<bool> {
        self.query(
            Command::new(Operation::SortedSetAdd)
                .key(key)
                .arg(score)
                .arg(member),
        )
    }

    pub fn sorted_set_remove(&self, key: &str, member: impl ToString) -> Result<bool> {
        self.query(Command::new(Operation::SortedSetRemove).key(key).arg(member))
    }

    pub fn sorted_set_score(&self, key: &str, member: impl ToString) -> Result<Option<f64>> {
        self.query(Command::new(Operation::SortedSetScore).key(key).arg(member))
    }

    pub fn sorted_set_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(
            Command::new(Operation::SortedSetRange)
                .key(key)
                .arg(start)
                .arg(stop),
        )
    }

    pub fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, f64)>> {
        let command = Command::new(Operation::SortedSetRange)
            .key(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES");
        self.run(command, Reply::into_scored)
    }

    pub fn sorted_set_cardinality(&self, key: &str) -> Result<i64> {
        self.query(Command::new(Operation::SortedSetCardinality).key(key))
    }

    pub fn sorted_set_rank(&self, key: &str, member: impl ToString) -> Result<Option<i64>> {
        self.query(Command::new(Operation::SortedSetRank).key(key).arg(member))
    }

    pub fn sorted_set_increment_by(
        &self,
        key: &str,
        by: f64,
        member: impl ToString,
    ) -> Result<f64> {
        self.query(
            Command::new(Operation::SortedSetIncrementBy)
                .key(key)
                .arg(by)
                .arg(member),
        )
    }

    /// スコア最小の要素を取り出す（Redis 5.0以降）
    pub fn sorted_set_pop_min(&self, key: &str) -> Result<Option<(String, f64)>> {
        let popped = self.run(
            Command::new(Operation::SortedSetPopMin).key(key),
            Reply::into_scored,
        )?;
        Ok(popped.into_iter().next())
    }

    // ========================================
    // 型によるキー取得
    // ========================================

    /// キーの型に応じたラッパーを返す。キーが存在しなければ None
    pub fn fetch(&self, key: &str) -> Result<Option<StashValue<'_>>> {
        let value = match self.type_of(key)? {
            KeyKind::None => return Ok(None),
            KeyKind::String => StashValue::String(StashString::new(key, self)),
            KeyKind::List => StashValue::List(StashList::new(key, self)),
            KeyKind::Hash => StashValue::Hash(StashHash::new(key, self)),
            KeyKind::Set => StashValue::Set(StashSet::new(key, self)),
            KeyKind::SortedSet => StashValue::SortedSet(StashSortedSet::new(key, self)),
        };
        Ok(Some(value))
    }
}

/// 秒単位に切り上げる（u64に収まらない分は飽和）
fn whole_seconds(t: Duration) -> u64 {
    if t.subsec_nanos() > 0 {
        t.as_secs().saturating_add(1)
    } else {
        t.as_secs()
    }
}

/// ブロッキング操作のタイムアウト秒数（0 = 無期限）
fn timeout_seconds(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, whole_seconds)
}
