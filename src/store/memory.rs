//! In-memory substitute for the backing store.
//!
//! Mirrors Redis observable semantics closely enough for tests and
//! standalone runs: inclusive list ranges with negative indexing, `-2`/`-1`
//! TTL sentinels, SET clearing expiry, and wrong-type errors when an
//! operation hits a key of another kind. Expiry is lazy: entries are purged
//! when touched. Time is measured with [`tokio::time::Instant`] so tests can
//! drive window expiry with `tokio::time::pause` and `advance`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process key-value store sharing one map across clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    /// Drop the entry when its expiry has passed, then hand it back.
    fn live_entry<'m>(
        map: &'m mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'m mut Entry> {
        let now = Instant::now();
        if map.get(key).is_some_and(|e| e.expired(now)) {
            map.remove(key);
        }
        map.get_mut(key)
    }

    fn incr_locked(map: &mut HashMap<String, Entry>, key: &str) -> StoreResult<i64> {
        match Self::live_entry(map, key) {
            None => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text("1".to_string()),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
            Some(entry) => match &mut entry.value {
                Value::Text(s) => {
                    let n: i64 = s
                        .parse::<i64>()
                        .map_err(|_| StoreError::WrongType(key.to_string()))?
                        + 1;
                    *s = n.to_string();
                    Ok(n)
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    fn ttl_locked(map: &mut HashMap<String, Entry>, key: &str) -> i64 {
        match Self::live_entry(map, key) {
            None => -2,
            Some(entry) => match entry.expires_at {
                None => -1,
                Some(at) => {
                    let left = at.saturating_duration_since(Instant::now());
                    let mut secs = left.as_secs() as i64;
                    if left.subsec_nanos() > 0 {
                        secs += 1;
                    }
                    secs
                }
            },
        }
    }
}

/// Normalize an inclusive Redis-style range against a list of `len`
/// elements. Returns `None` when the range selects nothing.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if start > stop {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Text(s) => Ok(Some(s.clone())),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        // SET overwrites any prior type and clears the TTL, as Redis does.
        self.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.lock();
        Ok(Self::live_entry(&mut map, key).is_some())
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<()> {
        let mut map = self.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => {
                let mut list = VecDeque::new();
                list.push_front(value.to_string());
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(list),
                        expires_at: None,
                    },
                );
                Ok(())
            }
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    list.push_front(value.to_string());
                    Ok(())
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(list) => {
                    let Some((start, stop)) = normalize_range(list.len(), start, stop) else {
                        return Ok(Vec::new());
                    };
                    Ok(list.iter().skip(start).take(stop - start + 1).cloned().collect())
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        let mut map = self.lock();
        let empty_after = match Self::live_entry(&mut map, key) {
            None => return Ok(()),
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    match normalize_range(list.len(), start, stop) {
                        None => {
                            list.clear();
                        }
                        Some((start, stop)) => {
                            list.truncate(stop + 1);
                            list.drain(..start);
                        }
                    }
                    list.is_empty()
                }
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
        };
        // Redis removes a list key once it has no elements left.
        if empty_after {
            map.remove(key);
        }
        Ok(())
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => {
                let mut set = HashSet::new();
                set.insert(member.to_string());
                map.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(set),
                        expires_at: None,
                    },
                );
                Ok(())
            }
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                    Ok(())
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut map = self.lock();
        let empty_after = match Self::live_entry(&mut map, key) {
            None => return Ok(()),
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    for member in members {
                        set.remove(member);
                    }
                    set.is_empty()
                }
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
        };
        if empty_after {
            map.remove(key);
        }
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut map = self.lock();
        match Self::live_entry(&mut map, key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut map = self.lock();
        Self::incr_locked(&mut map, key)
    }

    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<()> {
        let mut map = self.lock();
        if let Some(entry) = Self::live_entry(&mut map, key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds.max(0) as u64));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut map = self.lock();
        Ok(Self::ttl_locked(&mut map, key))
    }

    async fn incr_with_ttl(&self, key: &str) -> StoreResult<(i64, i64)> {
        // Single lock acquisition stands in for the Redis pipeline: both
        // reads observe the same state.
        let mut map = self.lock();
        let count = Self::incr_locked(&mut map, key)?;
        let ttl = Self::ttl_locked(&mut map, key);
        Ok((count, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_del_removes_multiple_keys() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.del(&["a", "b", "missing"]).await.unwrap();
        assert!(!store.exists("a").await.unwrap());
        assert!(!store.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_lpush_prepends() {
        let store = MemoryStore::new();
        store.lpush("l", "a").await.unwrap();
        store.lpush("l", "b").await.unwrap();
        store.lpush("l", "c").await.unwrap();
        let all = store.lrange("l", 0, -1).await.unwrap();
        assert_eq!(all, vec!["c", "b", "a"]);
        assert_eq!(store.llen("l").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lrange_negative_indices() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.lpush("l", v).await.unwrap();
        }
        // List is [d, c, b, a].
        assert_eq!(store.lrange("l", 2, -1).await.unwrap(), vec!["b", "a"]);
        assert_eq!(store.lrange("l", 0, 1).await.unwrap(), vec!["d", "c"]);
        assert_eq!(store.lrange("l", -2, -1).await.unwrap(), vec!["b", "a"]);
        assert!(store.lrange("l", 4, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ltrim_keeps_inclusive_range() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.lpush("l", v).await.unwrap();
        }
        store.ltrim("l", 0, 1).await.unwrap();
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), vec!["d", "c"]);
    }

    #[tokio::test]
    async fn test_ltrim_empty_range_removes_key() {
        let store = MemoryStore::new();
        store.lpush("l", "a").await.unwrap();
        store.ltrim("l", 5, 1).await.unwrap();
        assert!(!store.exists("l").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = MemoryStore::new();
        store.sadd("s", "x").await.unwrap();
        store.sadd("s", "y").await.unwrap();
        assert!(store.sismember("s", "x").await.unwrap());
        assert!(!store.sismember("s", "z").await.unwrap());

        store.srem("s", &["x".to_string()]).await.unwrap();
        assert!(!store.sismember("s", "x").await.unwrap());

        let mut members = store.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["y"]);
    }

    #[tokio::test]
    async fn test_incr_starts_at_one_without_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.ttl("c").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_ttl_sentinels() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("missing").await.unwrap(), -2);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);
        store.expire("k", 60).await.unwrap();
        let ttl = store.ttl("k").await.unwrap();
        assert!(ttl > 0 && ttl <= 60, "ttl was {ttl}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_removes_entry() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.expire("k", 5).await.unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), -2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_after_expiry_restarts_counter() {
        let store = MemoryStore::new();
        store.incr("c").await.unwrap();
        store.incr("c").await.unwrap();
        store.expire("c", 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        let (count, ttl) = store.incr_with_ttl("c").await.unwrap();
        assert_eq!(count, 1, "expired counter should restart");
        assert_eq!(ttl, -1, "fresh counter carries no expiry");
    }

    #[tokio::test]
    async fn test_set_clears_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.expire("k", 60).await.unwrap();
        store.set("k", "w").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store.lpush("l", "a").await.unwrap();
        assert!(matches!(
            store.incr("l").await,
            Err(StoreError::WrongType(_))
        ));
        store.set("k", "v").await.unwrap();
        assert!(matches!(
            store.lpush("k", "a").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some("v".to_string()));
    }
}
