//! Capability Set
//!
//! 接続先バックエンドが実際にサポートする操作の集合。
//! アダプタ構築時に一度だけバージョンを問い合わせて計算し、以後は変更しない。
//! 問い合わせに失敗してもエラーにはせず、ベースライン（スカラーの基本操作）に縮退する。

use crate::command::Operation;
use crate::connection::Connection;
use crate::error::{Result, StashError};
use rustc_hash::FxHashSet;
use std::fmt;
use tracing::{info, warn};

/// 常にサポートされているとみなす操作
const BASELINE: &[Operation] = &[
    Operation::Get,
    Operation::Set,
    Operation::Delete,
    Operation::Exists,
    Operation::Type,
];

/// バックエンドのバージョン
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// "7.2.4" のような文字列をパース
    ///
    /// 各要素は先頭の数字のみ読む（"7.2.4-rc1" → 7.2.4）。欠けた要素は0。
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });
        let major = parts.next()??;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    /// INFO応答から `redis_version:` 行を探してパース
    pub fn from_info(info: &str) -> Option<Self> {
        info.lines()
            .find_map(|line| line.trim().strip_prefix("redis_version:"))
            .and_then(Self::parse)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// ネゴシエート済みの操作集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    operations: FxHashSet<Operation>,
    disabled: FxHashSet<Operation>,
    version: Option<ServerVersion>,
}

impl CapabilitySet {
    /// ベースラインのみ
    pub fn baseline() -> Self {
        Self {
            operations: BASELINE.iter().copied().collect(),
            disabled: FxHashSet::default(),
            version: None,
        }
    }

    /// 指定バージョンでサポートされる全操作
    pub fn for_version(version: ServerVersion) -> Self {
        let operations = Operation::ALL
            .iter()
            .copied()
            .filter(|op| BASELINE.contains(op) || op.since() <= version)
            .collect();
        Self {
            operations,
            disabled: FxHashSet::default(),
            version: Some(version),
        }
    }

    /// 全操作（バージョン問い合わせを省略する場合）
    pub fn all() -> Self {
        Self {
            operations: Operation::ALL.iter().copied().collect(),
            disabled: FxHashSet::default(),
            version: None,
        }
    }

    /// 接続先にバージョンを問い合わせてCapability Setを計算
    ///
    /// 失敗してもエラーは返さず、ベースラインに縮退する。
    pub fn negotiate(conn: &mut dyn Connection) -> Self {
        match conn.server_info() {
            Ok(info) => match ServerVersion::from_info(&info) {
                Some(version) => {
                    let caps = Self::for_version(version);
                    info!(
                        version = %version,
                        operations = caps.len(),
                        "negotiated backend capabilities"
                    );
                    caps
                }
                None => {
                    warn!("backend info has no parsable version, using baseline capabilities");
                    Self::baseline()
                }
            },
            Err(e) => {
                warn!(error = %e, "capability probe failed, using baseline capabilities");
                Self::baseline()
            }
        }
    }

    /// 指定した操作を除いたコピーを返す
    pub fn without<I>(&self, operations: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut copy = self.clone();
        for op in operations {
            if copy.operations.remove(&op) {
                copy.disabled.insert(op);
            }
        }
        copy
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// サポートされていなければ `Unsupported` を返す
    pub fn require(&self, operation: Operation) -> Result<()> {
        if self.supports(operation) {
            return Ok(());
        }
        let since = operation.since();
        let capability = match self.version {
            _ if self.disabled.contains(&operation) => "disabled by configuration".to_string(),
            Some(version) => format!("requires redis >= {}, server reports {}", since, version),
            None => format!("requires redis >= {}, server version unknown", since),
        };
        Err(StashError::Unsupported {
            operation: operation.name(),
            capability,
        })
    }

    /// 問い合わせで得たバージョン（縮退時は None）
    pub fn version(&self) -> Option<ServerVersion> {
        self.version
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// サポートされる操作を名前順で返す
    pub fn operations(&self) -> Vec<Operation> {
        let mut ops: Vec<_> = self.operations.iter().copied().collect();
        ops.sort_by_key(|op| op.name());
        ops
    }
}
