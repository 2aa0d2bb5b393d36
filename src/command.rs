//! Command Table
//!
//! 抽象操作（`Operation`）とバックエンドのコマンド名の対応表。
//! 対応付けは網羅的な `match` で書かれているため、表に載っていない操作はコンパイルエラーになる。
//! バックエンドのコマンド名と公開APIの操作名が結び付くのはこのモジュールだけ。

use crate::capability::ServerVersion;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::LazyLock;

/// 抽象操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    // 基本操作
    Get,
    Set,
    Delete,
    Exists,
    Type,
    Expire,
    Ttl,
    Keys,
    GetDelete,
    // 数値操作
    Increment,
    Decrement,
    IncrementBy,
    // 複数操作
    MultiGet,
    MultiSet,
    // ハッシュ操作
    HashGet,
    HashSet,
    HashDelete,
    HashLength,
    HashMultiGet,
    HashValue,
    HashKeys,
    HashValues,
    HashExists,
    HashIncrementBy,
    // リスト操作
    ListPushLeft,
    ListPushRight,
    ListPopLeft,
    ListPopRight,
    ListBlockingPopLeft,
    ListBlockingPopRight,
    ListLength,
    ListRange,
    ListIndex,
    ListTrim,
    ListRemove,
    ListPosition,
    // セット操作
    SetAdd,
    SetRemove,
    SetMembers,
    SetIsMember,
    SetCardinality,
    // ソート済みセット操作
    SortedSetAdd,
    SortedSetRemove,
    SortedSetScore,
    SortedSetRange,
    SortedSetCardinality,
    SortedSetRank,
    SortedSetIncrementBy,
    SortedSetPopMin,
}

impl Operation {
    /// 全操作の一覧
    pub const ALL: &'static [Operation] = &[
        Operation::Get,
        Operation::Set,
        Operation::Delete,
        Operation::Exists,
        Operation::Type,
        Operation::Expire,
        Operation::Ttl,
        Operation::Keys,
        Operation::GetDelete,
        Operation::Increment,
        Operation::Decrement,
        Operation::IncrementBy,
        Operation::MultiGet,
        Operation::MultiSet,
        Operation::HashGet,
        Operation::HashSet,
        Operation::HashDelete,
        Operation::HashLength,
        Operation::HashMultiGet,
        Operation::HashValue,
        Operation::HashKeys,
        Operation::HashValues,
        Operation::HashExists,
        Operation::HashIncrementBy,
        Operation::ListPushLeft,
        Operation::ListPushRight,
        Operation::ListPopLeft,
        Operation::ListPopRight,
        Operation::ListBlockingPopLeft,
        Operation::ListBlockingPopRight,
        Operation::ListLength,
        Operation::ListRange,
        Operation::ListIndex,
        Operation::ListTrim,
        Operation::ListRemove,
        Operation::ListPosition,
        Operation::SetAdd,
        Operation::SetRemove,
        Operation::SetMembers,
        Operation::SetIsMember,
        Operation::SetCardinality,
        Operation::SortedSetAdd,
        Operation::SortedSetRemove,
        Operation::SortedSetScore,
        Operation::SortedSetRange,
        Operation::SortedSetCardinality,
        Operation::SortedSetRank,
        Operation::SortedSetIncrementBy,
        Operation::SortedSetPopMin,
    ];

    /// 公開APIとしての操作名（snake_case、バックエンドから独立）
    pub fn name(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Exists => "exists",
            Operation::Type => "type",
            Operation::Expire => "expire",
            Operation::Ttl => "ttl",
            Operation::Keys => "keys",
            Operation::GetDelete => "get_delete",
            Operation::Increment => "increment",
            Operation::Decrement => "decrement",
            Operation::IncrementBy => "increment_by",
            Operation::MultiGet => "multi_get",
            Operation::MultiSet => "multi_set",
            Operation::HashGet => "hash_get",
            Operation::HashSet => "hash_set",
            Operation::HashDelete => "hash_delete",
            Operation::HashLength => "hash_length",
            Operation::HashMultiGet => "hash_multi_get",
            Operation::HashValue => "hash_value",
            Operation::HashKeys => "hash_keys",
            Operation::HashValues => "hash_values",
            Operation::HashExists => "hash_exists",
            Operation::HashIncrementBy => "hash_increment_by",
            Operation::ListPushLeft => "list_push_left",
            Operation::ListPushRight => "list_push_right",
            Operation::ListPopLeft => "list_pop_left",
            Operation::ListPopRight => "list_pop_right",
            Operation::ListBlockingPopLeft => "list_blocking_pop_left",
            Operation::ListBlockingPopRight => "list_blocking_pop_right",
            Operation::ListLength => "list_length",
            Operation::ListRange => "list_range",
            Operation::ListIndex => "list_index",
            Operation::ListTrim => "list_trim",
            Operation::ListRemove => "list_remove",
            Operation::ListPosition => "list_position",
            Operation::SetAdd => "set_add",
            Operation::SetRemove => "set_remove",
            Operation::SetMembers => "set_members",
            Operation::SetIsMember => "set_is_member",
            Operation::SetCardinality => "set_cardinality",
            Operation::SortedSetAdd => "sorted_set_add",
            Operation::SortedSetRemove => "sorted_set_remove",
            Operation::SortedSetScore => "sorted_set_score",
            Operation::SortedSetRange => "sorted_set_range",
            Operation::SortedSetCardinality => "sorted_set_cardinality",
            Operation::SortedSetRank => "sorted_set_rank",
            Operation::SortedSetIncrementBy => "sorted_set_increment_by",
            Operation::SortedSetPopMin => "sorted_set_pop_min",
        }
    }

    /// バックエンド（Redis）のコマンド名
    pub fn command(self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Set => "SET",
            Operation::Delete => "DEL",
            Operation::Exists => "EXISTS",
            Operation::Type => "TYPE",
            Operation::Expire => "EXPIRE",
            Operation::Ttl => "TTL",
            Operation::Keys => "KEYS",
            Operation::GetDelete => "GETDEL",
            Operation::Increment => "INCR",
            Operation::Decrement => "DECR",
            Operation::IncrementBy => "INCRBY",
            Operation::MultiGet => "MGET",
            Operation::MultiSet => "MSET",
            Operation::HashGet => "HGET",
            Operation::HashSet => "HSET",
            Operation::HashDelete => "HDEL",
            Operation::HashLength => "HLEN",
            Operation::HashMultiGet => "HMGET",
            Operation::HashValue => "HGETALL",
            Operation::HashKeys => "HKEYS",
            Operation::HashValues => "HVALS",
            Operation::HashExists => "HEXISTS",
            Operation::HashIncrementBy => "HINCRBY",
            Operation::ListPushLeft => "LPUSH",
            Operation::ListPushRight => "RPUSH",
            Operation::ListPopLeft => "LPOP",
            Operation::ListPopRight => "RPOP",
            Operation::ListBlockingPopLeft => "BLPOP",
            Operation::ListBlockingPopRight => "BRPOP",
            Operation::ListLength => "LLEN",
            Operation::ListRange => "LRANGE",
            Operation::ListIndex => "LINDEX",
            Operation::ListTrim => "LTRIM",
            Operation::ListRemove => "LREM",
            Operation::ListPosition => "LPOS",
            Operation::SetAdd => "SADD",
            Operation::SetRemove => "SREM",
            Operation::SetMembers => "SMEMBERS",
            Operation::SetIsMember => "SISMEMBER",
            Operation::SetCardinality => "SCARD",
            Operation::SortedSetAdd => "ZADD",
            Operation::SortedSetRemove => "ZREM",
            Operation::SortedSetScore => "ZSCORE",
            Operation::SortedSetRange => "ZRANGE",
            Operation::SortedSetCardinality => "ZCARD",
            Operation::SortedSetRank => "ZRANK",
            Operation::SortedSetIncrementBy => "ZINCRBY",
            Operation::SortedSetPopMin => "ZPOPMIN",
        }
    }

    /// この操作に必要な最小バックエンドバージョン
    pub fn since(self) -> ServerVersion {
        match self {
            Operation::GetDelete => ServerVersion::new(6, 2, 0),
            Operation::ListPosition => ServerVersion::new(6, 0, 6),
            Operation::SortedSetPopMin => ServerVersion::new(5, 0, 0),
            Operation::HashGet
            | Operation::HashSet
            | Operation::HashDelete
            | Operation::HashLength
            | Operation::HashMultiGet
            | Operation::HashValue
            | Operation::HashKeys
            | Operation::HashValues
            | Operation::HashExists
            | Operation::HashIncrementBy
            | Operation::ListBlockingPopLeft
            | Operation::ListBlockingPopRight
            | Operation::SortedSetRank => ServerVersion::new(2, 0, 0),
            Operation::SortedSetAdd
            | Operation::SortedSetRemove
            | Operation::SortedSetScore
            | Operation::SortedSetRange
            | Operation::SortedSetCardinality
            | Operation::SortedSetIncrementBy => ServerVersion::new(1, 2, 0),
            Operation::MultiSet => ServerVersion::new(1, 0, 1),
            _ => ServerVersion::new(1, 0, 0),
        }
    }

    /// 応答にキー名が含まれる操作か（名前空間の除去が必要）
    pub fn returns_keys(self) -> bool {
        matches!(self, Operation::Keys)
    }

    /// 公開操作名から操作を引く
    pub fn from_name(name: &str) -> Option<Operation> {
        BY_NAME.get(name).copied()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 操作名 → 操作 の逆引き表
static BY_NAME: LazyLock<FxHashMap<&'static str, Operation>> =
    LazyLock::new(|| Operation::ALL.iter().map(|op| (op.name(), *op)).collect());

/// コマンド引数
///
/// キーと値を区別しておくことで、名前空間の付与をキーだけに適用できる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Key(String),
    Value(String),
}

impl Arg {
    pub fn as_str(&self) -> &str {
        match self {
            Arg::Key(s) | Arg::Value(s) => s,
        }
    }
}

/// バックエンドに送る1コマンド（操作 + 引数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    operation: Operation,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    /// キー引数を追加
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.args.push(Arg::Key(key.into()));
        self
    }

    /// 値引数を追加（送信前に文字列化する）
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(Arg::Value(value.to_string()));
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// バックエンドのコマンド名
    pub fn name(&self) -> &'static str {
        self.operation.command()
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// キー引数だけを変換した新しいコマンドを返す
    pub fn map_keys<F>(self, mut f: F) -> Self
    where
        F: FnMut(String) -> String,
    {
        let args = self
            .args
            .into_iter()
            .map(|arg| match arg {
                Arg::Key(k) => Arg::Key(f(k)),
                other => other,
            })
            .collect();
        Self {
            operation: self.operation,
            args,
        }
    }
}
