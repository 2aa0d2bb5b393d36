//! Stash: 型付きのキー・バリュー抽象化レイヤー
//!
//! スカラー値・リスト・ハッシュ・セット・ソート済みセットといったリモートのデータ構造を、
//! 1つの型付きインターフェースで扱う。実際の保存操作はバックエンドのコネクタに委譲する。
//!
//! ```rust,ignore
//! use stash::{Adapter, Side, StashConfig};
//!
//! let adapter = Adapter::connect(StashConfig::new("localhost"))?;
//! adapter.set("x", 42)?;
//! assert_eq!(adapter.get("x")?, Some("42".to_string()));
//!
//! adapter.list_push("jobs", "a", Side::Left)?;
//! if let Some(value) = adapter.fetch("jobs")? {
//!     let list = value.as_list().ok_or("not a list")?;
//!     println!("{:?}", list.all()?);
//! }
//! ```

pub mod adapter;
pub mod capability;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
#[cfg(feature = "redis-backend")]
pub mod redis_driver;
pub mod reply;
pub mod value;

pub use adapter::Adapter;
pub use capability::{CapabilitySet, ServerVersion};
pub use command::{Arg, Command, Operation};
pub use config::StashConfig;
pub use connection::{Connection, ConnectionManager, Connector, Namespaced};
pub use error::{Result, StashError};
#[cfg(feature = "redis-backend")]
pub use redis_driver::RedisConnector;
pub use reply::{FromReply, Reply};
pub use value::{
    IntoSide, KeyKind, Side, StashHash, StashList, StashSet, StashSortedSet, StashString,
    StashValue,
};
