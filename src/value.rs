//! Typed Value Wrappers
//!
//! キーとアダプタ参照の組で、型ごとに意味のある操作だけを公開する。
//! ラッパー自体はデータをキャッシュせず、接続も所有しない。構築時にI/Oは発生しない。

use crate::adapter::Adapter;
use crate::command::Operation;
use crate::error::{Result, StashError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ========================================
// キーの型
// ========================================

/// バックエンドが報告するキーの型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// キーが存在しない
    None,
    String,
    List,
    Hash,
    Set,
    SortedSet,
}

impl KeyKind {
    /// バックエンドの型名から変換する
    ///
    /// 対応するラッパーがない型（stream 等）は `UnknownKeyType`。
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(KeyKind::None),
            "string" => Ok(KeyKind::String),
            "list" => Ok(KeyKind::List),
            "hash" => Ok(KeyKind::Hash),
            "set" => Ok(KeyKind::Set),
            "zset" => Ok(KeyKind::SortedSet),
            other => Err(StashError::UnknownKeyType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::None => "none",
            KeyKind::String => "string",
            KeyKind::List => "list",
            KeyKind::Hash => "hash",
            KeyKind::Set => "set",
            KeyKind::SortedSet => "zset",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// リストの端
// ========================================

/// リストのどちらの端を操作するか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub(crate) fn push_operation(self) -> Operation {
        match self {
            Side::Left => Operation::ListPushLeft,
            Side::Right => Operation::ListPushRight,
        }
    }

    pub(crate) fn pop_operation(self) -> Operation {
        match self {
            Side::Left => Operation::ListPopLeft,
            Side::Right => Operation::ListPopRight,
        }
    }

    pub(crate) fn blocking_pop_operation(self) -> Operation {
        match self {
            Side::Left => Operation::ListBlockingPopLeft,
            Side::Right => Operation::ListBlockingPopRight,
        }
    }
}

impl FromStr for Side {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("left") {
            Ok(Side::Left)
        } else if s.eq_ignore_ascii_case("right") {
            Ok(Side::Right)
        } else {
            Err(StashError::invalid_argument(format!(
                "side must be 'left' or 'right', got '{}'",
                s
            )))
        }
    }
}

/// `Side` または文字列を受け付けるための変換
pub trait IntoSide {
    fn into_side(self) -> Result<Side>;
}

impl IntoSide for Side {
    fn into_side(self) -> Result<Side> {
        Ok(self)
    }
}

impl IntoSide for &str {
    fn into_side(self) -> Result<Side> {
        self.parse()
    }
}

impl IntoSide for String {
    fn into_side(self) -> Result<Side> {
        self.parse()
    }
}

impl IntoSide for &String {
    fn into_side(self) -> Result<Side> {
        self.parse()
    }
}

// ========================================
// ラッパー
// ========================================

/// `fetch` が返す型付きの値
#[derive(Clone)]
pub enum StashValue<'a> {
    String(StashString<'a>),
    List(StashList<'a>),
    Hash(StashHash<'a>),
    Set(StashSet<'a>),
    SortedSet(StashSortedSet<'a>),
}

impl<'a> StashValue<'a> {
    pub fn key(&self) -> &str {
        match self {
            StashValue::String(v) => v.key(),
            StashValue::List(v) => v.key(),
            StashValue::Hash(v) => v.key(),
            StashValue::Set(v) => v.key(),
            StashValue::SortedSet(v) => v.key(),
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            StashValue::String(_) => KeyKind::String,
            StashValue::List(_) => KeyKind::List,
            StashValue::Hash(_) => KeyKind::Hash,
            StashValue::Set(_) => KeyKind::Set,
            StashValue::SortedSet(_) => KeyKind::SortedSet,
        }
    }

    pub fn as_string(&self) -> Option<&StashString<'a>> {
        match self {
            StashValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&StashList<'a>> {
        match self {
            StashValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&StashHash<'a>> {
        match self {
            StashValue::Hash(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&StashSet<'a>> {
        match self {
            StashValue::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&StashSortedSet<'a>> {
        match self {
            StashValue::SortedSet(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for StashValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StashValue")
            .field("kind", &self.kind())
            .field("key", &self.key())
            .finish()
    }
}

/// 各ラッパー共通の定義（キー + アダプタ参照）
macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name<'a> {
            key: String,
            adapter: &'a Adapter,
        }

        impl<'a> $name<'a> {
            pub fn new(key: impl Into<String>, adapter: &'a Adapter) -> Self {
                Self {
                    key: key.into(),
                    adapter,
                }
            }

            pub fn key(&self) -> &str {
                &self.key
            }

            pub fn kind(&self) -> KeyKind {
                $kind
            }
        }

        impl fmt::Debug for $name<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("key", &self.key)
                    .finish()
            }
        }
    };
}

wrapper!(
    /// 文字列値
    StashString,
    KeyKind::String
);
wrapper!(
    /// リスト
    StashList,
    KeyKind::List
);
wrapper!(
    /// ハッシュ
    StashHash,
    KeyKind::Hash
);
wrapper!(
    /// セット
    StashSet,
    KeyKind::Set
);
wrapper!(
    /// ソート済みセット
    StashSortedSet,
    KeyKind::SortedSet
);

impl StashString<'_> {
    pub fn get(&self) -> Result<Option<String>> {
        self.adapter.get(&self.key)
    }

    pub fn set(&self, value: impl ToString) -> Result<()> {
        self.adapter.set(&self.key, value)
    }

    pub fn increment(&self) -> Result<i64> {
        self.adapter.increment(&self.key)
    }

    pub fn decrement(&self) -> Result<i64> {
        self.adapter.decrement(&self.key)
    }

    pub fn delete(&self) -> Result<bool> {
        self.adapter.delete(&self.key)
    }

    pub fn exists(&self) -> Result<bool> {
        self.adapter.exists(&self.key)
    }

    pub fn expire(&self, ttl: Duration) -> Result<bool> {
        self.adapter.expire(&self.key, ttl)
    }

    pub fn ttl(&self) -> Result<i64> {
        self.adapter.ttl(&self.key)
    }
}

impl StashList<'_> {
    pub fn push(&self, value: impl ToString, side: impl IntoSide) -> Result<i64> {
        self.adapter.list_push(&self.key, value, side)
    }

    pub fn pop(&self, side: impl IntoSide) -> Result<Option<String>> {
        self.adapter.list_pop(&self.key, side)
    }

    /// `timeout` が `None` またはゼロなら無期限に待つ
    pub fn blocking_pop(&self, side: impl IntoSide, timeout: Option<Duration>) -> Result<String> {
        self.adapter.list_blocking_pop(&self.key, side, timeout)
    }

    pub fn length(&self) -> Result<i64> {
        self.adapter.list_length(&self.key)
    }

    pub fn range(&self, start: i64, stop: i64) -> Result<Vec<String>> {
        self.adapter.list_range(&self.key, start, stop)
    }

    /// 全要素
    pub fn all(&self) -> Result<Vec<String>> {
        self.range(0, -1)
    }

    pub fn index(&self, index: i64) -> Result<Option<String>> {
        self.adapter.list_index(&self.key, index)
    }

    pub fn trim(&self, start: i64, stop: i64) -> Result<()> {
        self.adapter.list_trim(&self.key, start, stop)
    }

    pub fn remove(&self, count: i64, value: impl ToString) -> Result<i64> {
        self.adapter.list_remove(&self.key, count, value)
    }
}

impl StashHash<'_> {
    pub fn get(&self, field: &str) -> Result<Option<String>> {
        self.adapter.hash_get(&self.key, field)
    }

    pub fn set(&self, field: &str, value: impl ToString) -> Result<bool> {
        self.adapter.hash_set(&self.key, field, value)
    }

    pub fn delete(&self, field: &str) -> Result<bool> {
        self.adapter.hash_delete(&self.key, field)
    }

    pub fn length(&self) -> Result<i64> {
        self.adapter.hash_length(&self.key)
    }

    pub fn multi_get<F: AsRef<str>>(&self, fields: &[F]) -> Result<Vec<Option<String>>> {
        self.adapter.hash_multi_get(&self.key, fields)
    }

    /// 全フィールドと値の組
    pub fn value(&self) -> Result<Vec<(String, String)>> {
        self.adapter.hash_value(&self.key)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.adapter.hash_keys(&self.key)
    }

    pub fn values(&self) -> Result<Vec<String>> {
        self.adapter.hash_values(&self.key)
    }

    pub fn exists(&self, field: &str) -> Result<bool> {
        self.adapter.hash_exists(&self.key, field)
    }

    pub fn increment_by(&self, field: &str, by: i64) -> Result<i64> {
        self.adapter.hash_increment_by(&self.key, field, by)
    }
}

impl StashSet<'_> {
    pub fn add(&self, member: impl ToString) -> Result<bool> {
        self.adapter.set_add(&self.key, member)
    }

    pub fn remove(&self, member: impl ToString) -> Result<bool> {
        self.adapter.set_remove(&self.key, member)
    }

    pub fn members(&self) -> Result<Vec<String>> {
        self.adapter.set_members(&self.key)
    }

    pub fn contains(&self, member: impl ToString) -> Result<bool> {
        self.adapter.set_is_member(&self.key, member)
    }

    pub fn cardinality(&self) -> Result<i64> {
        self.adapter.set_cardinality(&self.key)
    }
}

impl StashSortedSet<'_> {
    pub fn add(&self, score: f64, member: impl ToString) -> Result<bool> {
        self.adapter.sorted_set_add(&self.key, score, member)
    }

    pub fn remove(&self, member: impl ToString) -> Result<bool> {
        self.adapter.sorted_set_remove(&self.key, member)
    }

    pub fn score(&self, member: impl ToString) -> Result<Option<f64>> {
        self.adapter.sorted_set_score(&self.key, member)
    }

    pub fn range(&self, start: i64, stop: i64) -> Result<Vec<String>> {
        self.adapter.sorted_set_range(&self.key, start, stop)
    }

    pub fn range_with_scores(&self, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
        self.adapter
            .sorted_set_range_with_scores(&self.key, start, stop)
    }

    pub fn cardinality(&self) -> Result<i64> {
        self.adapter.sorted_set_cardinality(&self.key)
    }

    pub fn rank(&self, member: impl ToString) -> Result<Option<i64>> {
        self.adapter.sorted_set_rank(&self.key, member)
    }

    pub fn increment_by(&self, by: f64, member: impl ToString) -> Result<f64> {
        self.adapter.sorted_set_increment_by(&self.key, by, member)
    }

    pub fn pop_min(&self) -> Result<Option<(String, f64)>> {
        self.adapter.sorted_set_pop_min(&self.key)
    }
}
