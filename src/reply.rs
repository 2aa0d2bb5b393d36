//! バックエンド応答の変換
//!
//! コネクションから返る生の応答（`Reply`）を、各操作の戻り値型に変換する。
//! 期待と異なる形の応答は `StashError::Backend` として扱う。

use crate::error::{Result, StashError};

/// バックエンドに依存しない生の応答
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    /// バルク文字列
    Data(String),
    /// ステータス応答（"OK" 以外）
    Status(String),
    Okay,
    Array(Vec<Reply>),
    Double(f64),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// 応答の種類名（エラーメッセージ用）
    fn describe(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Int(_) => "integer",
            Reply::Data(_) => "bulk string",
            Reply::Status(_) => "status",
            Reply::Okay => "OK",
            Reply::Array(_) => "array",
            Reply::Double(_) => "double",
        }
    }

    fn unexpected(&self, expected: &str) -> StashError {
        StashError::backend(format!(
            "unexpected reply: expected {}, got {}",
            expected,
            self.describe()
        ))
    }

    /// `[field, value, field, value, ...]` 形式の配列を組に変換（HGETALL）
    pub fn into_pairs(self) -> Result<Vec<(String, String)>> {
        let items: Vec<String> = FromReply::from_reply(self)?;
        if items.len() % 2 != 0 {
            return Err(StashError::backend(
                "unexpected reply: odd number of elements in pair list",
            ));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Ok(pairs)
    }

    /// `[member, score, member, score, ...]` 形式の配列を変換（ZRANGE WITHSCORES / ZPOPMIN）
    pub fn into_scored(self) -> Result<Vec<(String, f64)>> {
        let items = match self {
            Reply::Nil => return Ok(Vec::new()),
            Reply::Array(items) => items,
            other => return Err(other.unexpected("array")),
        };
        if items.len() % 2 != 0 {
            return Err(StashError::backend(
                "unexpected reply: odd number of elements in scored list",
            ));
        }
        let mut scored = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
            scored.push((String::from_reply(member)?, f64::from_reply(score)?));
        }
        Ok(scored)
    }

    /// ブロッキングポップの応答 `[key, value]` から値を取り出す
    ///
    /// nil はタイムアウト経過を意味する。
    pub fn into_popped(self) -> Result<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Array(mut items) if items.len() == 2 => {
                let value = items.pop().unwrap_or(Reply::Nil);
                String::from_reply(value).map(Some)
            }
            other => Err(other.unexpected("[key, value] pair")),
        }
    }
}

/// 応答から値への変換
pub trait FromReply: Sized {
    fn from_reply(reply: Reply) -> Result<Self>;
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(_reply: Reply) -> Result<Self> {
        Ok(())
    }
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Data(s) | Reply::Status(s) => Ok(s),
            Reply::Okay => Ok("OK".to_string()),
            Reply::Int(i) => Ok(i.to_string()),
            Reply::Double(f) => Ok(f.to_string()),
            other => Err(other.unexpected("string")),
        }
    }
}

impl FromReply for i64 {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Int(i) => Ok(i),
            Reply::Data(ref s) | Reply::Status(ref s) => s.parse().map_err(|_| {
                StashError::backend(format!("unexpected reply: '{}' is not an integer", s))
            }),
            other => Err(other.unexpected("integer")),
        }
    }
}

impl FromReply for f64 {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Double(f) => Ok(f),
            Reply::Int(i) => Ok(i as f64),
            Reply::Data(ref s) | Reply::Status(ref s) => s.parse().map_err(|_| {
                StashError::backend(format!("unexpected reply: '{}' is not a number", s))
            }),
            other => Err(other.unexpected("number")),
        }
    }
}

impl FromReply for bool {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Int(i) => Ok(i != 0),
            Reply::Okay | Reply::Status(_) => Ok(true),
            Reply::Nil => Ok(false),
            other => Err(other.unexpected("integer")),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Nil => Ok(None),
            other => T::from_reply(other).map(Some),
        }
    }
}

impl<T: FromReply> FromReply for Vec<T> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Nil => Ok(Vec::new()),
            Reply::Array(items) => items.into_iter().map(T::from_reply).collect(),
            other => Err(other.unexpected("array")),
        }
    }
}
