//! テスト用のインメモリ・バックエンド
//!
//! Redisのコマンドのうちアダプタが使うものだけを実装し、接続・解放・コマンド送信の回数を数える。

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use stash::{Arg, Command, Connection, Connector, Reply, Result, StashError};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// テスト中のログを出力する（複数回呼んでもよい）
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("stash=debug")
        .with_test_writer()
        .try_init();
}

/// 呼び出し回数
#[derive(Default)]
pub struct Stats {
    pub connects: AtomicUsize,
    pub quits: AtomicUsize,
    pub commands: AtomicUsize,
    pub probes: AtomicUsize,
}

impl Stats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

enum Entry {
    Str(String),
    List(VecDeque<String>),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, f64>),
    /// アダプタが知らない型（stream 等）
    Other(String),
}

impl Entry {
    fn type_name(&self) -> &str {
        match self {
            Entry::Str(_) => "string",
            Entry::List(_) => "list",
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::ZSet(_) => "zset",
            Entry::Other(name) => name,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::List(l) => l.is_empty(),
            Entry::Hash(h) => h.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
            Entry::Str(_) | Entry::Other(_) => false,
        }
    }
}

type Store = HashMap<String, Entry>;

/// インメモリのRedis風バックエンド
#[derive(Clone)]
pub struct FakeRedis {
    store: Arc<Mutex<Store>>,
    /// LPUSH/RPUSH のたびに通知し、待機中の BLPOP/BRPOP を起こす
    pushed: Arc<Condvar>,
    pub stats: Arc<Stats>,
    version: Option<String>,
    refuse: Arc<AtomicBool>,
}

impl FakeRedis {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            pushed: Arc::new(Condvar::new()),
            stats: Arc::new(Stats::default()),
            version: Some("7.2.4".to_string()),
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// INFOで報告するバージョン
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// INFOがエラーを返す
    pub fn with_broken_probe(mut self) -> Self {
        self.version = None;
        self
    }

    /// 以後の接続を拒否するかどうか
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// 未知の型のキーを直接作る
    pub fn insert_raw_type(&self, key: &str, type_name: &str) {
        self.store
            .lock()
            .insert(key.to_string(), Entry::Other(type_name.to_string()));
    }

    /// 名前空間を含む生のキー一覧
    pub fn raw_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.store.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

impl Connector for FakeRedis {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StashError::Connection("connection refused".to_string()));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            server: self.clone(),
        }))
    }
}

struct FakeConnection {
    server: FakeRedis,
}

impl Connection for FakeConnection {
    fn execute(&mut self, command: &Command) -> Result<Reply> {
        self.server.stats.commands.fetch_add(1, Ordering::SeqCst);
        let args: Vec<String> = command.args().iter().map(|a| a.as_str().to_string()).collect();
        match command.name() {
            "BLPOP" | "BRPOP" => self.blocking_pop(command.name() == "BLPOP", &args),
            name => {
                let reply = apply(&mut self.server.store.lock(), name, &args);
                if matches!(name, "LPUSH" | "RPUSH") {
                    self.server.pushed.notify_all();
                }
                reply
            }
        }
    }

    fn server_info(&mut self) -> Result<String> {
        self.server.stats.probes.fetch_add(1, Ordering::SeqCst);
        match &self.server.version {
            Some(v) => Ok(format!("# Server\r\nredis_version:{}\r\nredis_mode:standalone\r\n", v)),
            None => Err(StashError::Backend("ERR unknown command 'INFO'".to_string())),
        }
    }

    fn quit(&mut self) -> Result<()> {
        self.server.stats.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakeConnection {
    /// 要素が来るまで待つ。タイムアウト0は無期限
    fn blocking_pop(&self, left: bool, args: &[String]) -> Result<Reply> {
        let key = &args[0];
        let seconds: u64 = args[1].parse().map_err(|_| {
            StashError::Backend("ERR timeout is not a float or out of range".into())
        })?;
        let deadline = (seconds > 0)
            .then(|| Instant::now().checked_add(Duration::from_secs(seconds)))
            .flatten();
        let mut store = self.server.store.lock();
        loop {
            if let Some(value) = pop(&mut store, key, left)? {
                return Ok(pair(key, value));
            }
            match deadline {
                None if seconds > 0 => {
                    return Err(StashError::Backend("ERR timeout is out of range".into()))
                }
                None => self.server.pushed.wait(&mut store),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(Reply::Nil);
                    }
                    let _ = self.server.pushed.wait_until(&mut store, deadline);
                }
            }
        }
    }
}

fn pair(key: &str, value: String) -> Reply {
    Reply::Array(vec![Reply::Data(key.to_string()), Reply::Data(value)])
}

fn wrong_type() -> StashError {
    StashError::Backend(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

fn parse_int(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| StashError::Backend("ERR value is not an integer or out of range".into()))
}

fn parse_float(s: &str) -> Result<f64> {
    s.parse()
        .map_err(|_| StashError::Backend("ERR value is not a valid float".into()))
}

fn data(s: impl Into<String>) -> Reply {
    Reply::Data(s.into())
}

fn opt(value: Option<String>) -> Reply {
    value.map(Reply::Data).unwrap_or(Reply::Nil)
}

fn array<I: IntoIterator<Item = String>>(items: I) -> Reply {
    Reply::Array(items.into_iter().map(Reply::Data).collect())
}

/// Redis流の start/stop（両端含む、負数は末尾から）を添字範囲に変換
fn bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn pop(store: &mut Store, key: &str, left: bool) -> Result<Option<String>> {
    let value = match store.get_mut(key) {
        None => return Ok(None),
        Some(Entry::List(list)) => {
            if left {
                list.pop_front()
            } else {
                list.pop_back()
            }
        }
        Some(_) => return Err(wrong_type()),
    };
    drop_if_empty(store, key);
    Ok(value)
}

fn drop_if_empty(store: &mut Store, key: &str) {
    if store.get(key).is_some_and(Entry::is_empty) {
        store.remove(key);
    }
}

macro_rules! typed {
    ($store:expr, $key:expr, $variant:ident) => {
        match $store.get($key) {
            None => None,
            Some(Entry::$variant(inner)) => Some(inner),
            Some(_) => return Err(wrong_type()),
        }
    };
}

macro_rules! typed_mut {
    ($store:expr, $key:expr, $variant:ident) => {
        match $store
            .entry($key.to_string())
            .or_insert_with(|| Entry::$variant(Default::default()))
        {
            Entry::$variant(inner) => inner,
            _ => return Err(wrong_type()),
        }
    };
}

fn sorted_members(z: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
    let mut members: Vec<_> = z.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    members
}

fn apply(store: &mut Store, name: &str, args: &[String]) -> Result<Reply> {
    let reply = match name {
        // 基本操作
        "SET" => {
            store.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Reply::Okay
        }
        "GET" => opt(typed!(store, &args[0], Str).cloned()),
        "GETDEL" => {
            let value = typed!(store, &args[0], Str).cloned();
            store.remove(&args[0]);
            opt(value)
        }
        "DEL" => Reply::Int(i64::from(store.remove(&args[0]).is_some())),
        "EXISTS" => Reply::Int(i64::from(store.contains_key(&args[0]))),
        "TYPE" => Reply::Status(
            store
                .get(&args[0])
                .map(|e| e.type_name().to_string())
                .unwrap_or_else(|| "none".to_string()),
        ),
        "EXPIRE" => Reply::Int(i64::from(store.contains_key(&args[0]))),
        "TTL" => Reply::Int(if store.contains_key(&args[0]) { -1 } else { -2 }),
        "KEYS" => {
            let pattern = &args[0];
            let prefix = pattern.trim_end_matches('*');
            let mut keys: Vec<String> = store
                .keys()
                .filter(|k| {
                    if pattern.ends_with('*') {
                        k.starts_with(prefix)
                    } else {
                        *k == pattern
                    }
                })
                .cloned()
                .collect();
            keys.sort();
            array(keys)
        }
        "INCR" | "DECR" | "INCRBY" => {
            let by = match name {
                "INCR" => 1,
                "DECR" => -1,
                _ => parse_int(&args[1])?,
            };
            let current = match typed!(store, &args[0], Str) {
                Some(s) => parse_int(s)?,
                None => 0,
            };
            let next = current + by;
            store.insert(args[0].clone(), Entry::Str(next.to_string()));
            Reply::Int(next)
        }
        "MGET" => Reply::Array(
            args.iter()
                .map(|k| match store.get(k) {
                    Some(Entry::Str(s)) => data(s.clone()),
                    _ => Reply::Nil,
                })
                .collect(),
        ),
        "MSET" => {
            for chunk in args.chunks(2) {
                store.insert(chunk[0].clone(), Entry::Str(chunk[1].clone()));
            }
            Reply::Okay
        }

        // ハッシュ操作
        "HSET" => {
            let hash = typed_mut!(store, &args[0], Hash);
            Reply::Int(i64::from(hash.insert(args[1].clone(), args[2].clone()).is_none()))
        }
        "HGET" => opt(typed!(store, &args[0], Hash).and_then(|h| h.get(&args[1]).cloned())),
        "HDEL" => {
            let removed = match store.get_mut(&args[0]) {
                None => false,
                Some(Entry::Hash(h)) => h.remove(&args[1]).is_some(),
                Some(_) => return Err(wrong_type()),
            };
            drop_if_empty(store, &args[0]);
            Reply::Int(i64::from(removed))
        }
        "HLEN" => Reply::Int(typed!(store, &args[0], Hash).map_or(0, |h| h.len() as i64)),
        "HMGET" => {
            let hash = typed!(store, &args[0], Hash);
            Reply::Array(
                args[1..]
                    .iter()
                    .map(|f| opt(hash.and_then(|h| h.get(f).cloned())))
                    .collect(),
            )
        }
        "HGETALL" => array(
            typed!(store, &args[0], Hash)
                .map(|h| {
                    h.iter()
                        .flat_map(|(k, v)| [k.clone(), v.clone()])
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        ),
        "HKEYS" => array(
            typed!(store, &args[0], Hash)
                .map(|h| h.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
        ),
        "HVALS" => array(
            typed!(store, &args[0], Hash)
                .map(|h| h.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
        ),
        "HEXISTS" => Reply::Int(i64::from(
            typed!(store, &args[0], Hash).is_some_and(|h| h.contains_key(&args[1])),
        )),
        "HINCRBY" => {
            let by = parse_int(&args[2])?;
            let hash = typed_mut!(store, &args[0], Hash);
            let current = match hash.get(&args[1]) {
                Some(s) => parse_int(s)?,
                None => 0,
            };
            hash.insert(args[1].clone(), (current + by).to_string());
            Reply::Int(current + by)
        }

        // リスト操作
        "LPUSH" | "RPUSH" => {
            let list = typed_mut!(store, &args[0], List);
            for value in &args[1..] {
                if name == "LPUSH" {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            Reply::Int(list.len() as i64)
        }
        "LPOP" => opt(pop(store, &args[0], true)?),
        "RPOP" => opt(pop(store, &args[0], false)?),
        "LLEN" => Reply::Int(typed!(store, &args[0], List).map_or(0, |l| l.len() as i64)),
        "LRANGE" => {
            let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
            let items = typed!(store, &args[0], List)
                .and_then(|l| {
                    bounds(l.len(), start, stop)
                        .map(|(s, e)| l.range(s..=e).cloned().collect::<Vec<_>>())
                })
                .unwrap_or_default();
            array(items)
        }
        "LINDEX" => {
            let index = parse_int(&args[1])?;
            opt(typed!(store, &args[0], List).and_then(|l| {
                let i = if index < 0 { l.len() as i64 + index } else { index };
                usize::try_from(i).ok().and_then(|i| l.get(i).cloned())
            }))
        }
        "LTRIM" => {
            let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
            if let Some(Entry::List(list)) = store.get_mut(&args[0]) {
                *list = match bounds(list.len(), start, stop) {
                    Some((s, e)) => list.range(s..=e).cloned().collect(),
                    None => VecDeque::new(),
                };
            }
            drop_if_empty(store, &args[0]);
            Reply::Okay
        }
        "LREM" => {
            let count = parse_int(&args[1])?;
            let mut removed = 0i64;
            if let Some(Entry::List(list)) = store.get_mut(&args[0]) {
                let limit = if count == 0 { i64::MAX } else { count.abs() };
                let mut kept = VecDeque::with_capacity(list.len());
                for item in list.drain(..) {
                    if item == args[2] && removed < limit {
                        removed += 1;
                    } else {
                        kept.push_back(item);
                    }
                }
                *list = kept;
            }
            drop_if_empty(store, &args[0]);
            Reply::Int(removed)
        }
        "LPOS" => match typed!(store, &args[0], List) {
            Some(l) => l
                .iter()
                .position(|v| *v == args[1])
                .map_or(Reply::Nil, |i| Reply::Int(i as i64)),
            None => Reply::Nil,
        },

        // セット操作
        "SADD" => {
            let set = typed_mut!(store, &args[0], Set);
            Reply::Int(i64::from(set.insert(args[1].clone())))
        }
        "SREM" => {
            let removed = match store.get_mut(&args[0]) {
                None => false,
                Some(Entry::Set(s)) => s.remove(&args[1]),
                Some(_) => return Err(wrong_type()),
            };
            drop_if_empty(store, &args[0]);
            Reply::Int(i64::from(removed))
        }
        "SMEMBERS" => array(
            typed!(store, &args[0], Set)
                .map(|s| s.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
        ),
        "SISMEMBER" => Reply::Int(i64::from(
            typed!(store, &args[0], Set).is_some_and(|s| s.contains(&args[1])),
        )),
        "SCARD" => Reply::Int(typed!(store, &args[0], Set).map_or(0, |s| s.len() as i64)),

        // ソート済みセット操作
        "ZADD" => {
            let score = parse_float(&args[1])?;
            let zset = typed_mut!(store, &args[0], ZSet);
            Reply::Int(i64::from(zset.insert(args[2].clone(), score).is_none()))
        }
        "ZREM" => {
            let removed = match store.get_mut(&args[0]) {
                None => false,
                Some(Entry::ZSet(z)) => z.remove(&args[1]).is_some(),
                Some(_) => return Err(wrong_type()),
            };
            drop_if_empty(store, &args[0]);
            Reply::Int(i64::from(removed))
        }
        "ZSCORE" => opt(typed!(store, &args[0], ZSet)
            .and_then(|z| z.get(&args[1]))
            .map(|s| s.to_string())),
        "ZCARD" => Reply::Int(typed!(store, &args[0], ZSet).map_or(0, |z| z.len() as i64)),
        "ZRANK" => match typed!(store, &args[0], ZSet) {
            Some(z) => sorted_members(z)
                .iter()
                .position(|(m, _)| *m == args[1])
                .map_or(Reply::Nil, |i| Reply::Int(i as i64)),
            None => Reply::Nil,
        },
        "ZINCRBY" => {
            let by = parse_float(&args[1])?;
            let zset = typed_mut!(store, &args[0], ZSet);
            let score = zset.entry(args[2].clone()).or_insert(0.0);
            *score += by;
            data(score.to_string())
        }
        "ZRANGE" => {
            let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
            let with_scores = args.get(3).is_some_and(|a| a.eq_ignore_ascii_case("WITHSCORES"));
            let members = typed!(store, &args[0], ZSet)
                .map(sorted_members)
                .unwrap_or_default();
            let selected = match bounds(members.len(), start, stop) {
                Some((s, e)) => members[s..=e].to_vec(),
                None => Vec::new(),
            };
            let mut items = Vec::new();
            for (member, score) in selected {
                items.push(member);
                if with_scores {
                    items.push(score.to_string());
                }
            }
            array(items)
        }
        "ZPOPMIN" => {
            let first = typed!(store, &args[0], ZSet)
                .and_then(|z| sorted_members(z).into_iter().next());
            match first {
                Some((member, score)) => {
                    if let Some(Entry::ZSet(z)) = store.get_mut(&args[0]) {
                        z.remove(&member);
                    }
                    drop_if_empty(store, &args[0]);
                    array([member, score.to_string()])
                }
                None => Reply::Array(Vec::new()),
            }
        }
        other => {
            return Err(StashError::Backend(format!(
                "ERR unknown command '{}'",
                other
            )))
        }
    };
    Ok(reply)
}

/// 送信されたコマンドの引数からキーだけを取り出す（名前空間の確認用）
pub fn keys_of(command: &Command) -> Vec<String> {
    command
        .args()
        .iter()
        .filter_map(|a| match a {
            Arg::Key(k) => Some(k.clone()),
            Arg::Value(_) => None,
        })
        .collect()
}
