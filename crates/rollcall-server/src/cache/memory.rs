//! Process-local [`KvCache`] on a `DashMap`, used when Redis is disabled or
//! unreachable at startup.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use regex::Regex;

use super::kv::{CacheError, KvCache, rank_bounds};

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Hash(HashMap<String, i64>),
    Set(HashSet<String>),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Command(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

/// Translates a Redis glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CacheError::Command(format!("invalid pattern: {e}")))
}

fn key_slot(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Members ordered by (score, member), as Redis orders sorted sets.
fn ordered(set: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = set.iter().map(|(m, s)| (m.clone(), *s)).collect();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    items
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` on the live entry for `key`, creating it with `init` when
    /// absent or expired.
    fn with_entry<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Slot,
        f: impl FnOnce(&mut Entry) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry::new(init()));
                }
                f(occupied.get_mut())
            }
            MapEntry::Vacant(vacant) => {
                let mut entry = vacant.insert(Entry::new(init()));
                f(entry.value_mut())
            }
        }
    }

    /// Reads the live entry for `key`, dropping it if expired.
    fn read<T>(&self, key: &str, f: impl FnOnce(&Entry) -> T) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(f(&entry)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired());
        }
        None
    }
}

#[async_trait]
impl KvCache for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |e| match e.slot {
            Slot::Text(ref s) => Ok(s.clone()),
            _ => Err(wrong_type(key)),
        })
        .transpose()
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key)
                && !entry.is_expired()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut keys: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired())
            .map(|e| (key_slot(e.key()), e.key().clone()))
            .filter(|(slot, _)| *slot >= cursor)
            .collect();
        keys.sort();

        // The cursor is a position in key-hash order, so deletions between
        // calls never shift keys that are still to be visited.
        let mut end = count.max(1).min(keys.len());
        while end < keys.len() && keys[end].0 == keys[end - 1].0 {
            end += 1;
        }
        let batch = keys[..end]
            .iter()
            .filter(|(_, k)| matcher.is_match(k))
            .map(|(_, k)| k.clone())
            .collect();
        let next = if end >= keys.len() {
            0
        } else {
            keys[end - 1].0 + 1
        };
        Ok((next, batch))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        self.with_entry(
            key,
            || Slot::Text("0".into()),
            |entry| match entry.slot {
                Slot::Text(ref mut s) => {
                    let current: i64 = s.parse().map_err(|_| {
                        CacheError::Command("value is not an integer or out of range".into())
                    })?;
                    let next = current + by;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        self.with_entry(
            key,
            || Slot::Hash(HashMap::new()),
            |entry| match entry.slot {
                Slot::Hash(ref mut map) => {
                    let value = map.entry(field.to_string()).or_insert(0);
                    *value += by;
                    Ok(*value)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError> {
        self.read(key, |e| match e.slot {
            Slot::Hash(ref map) => Ok(map.clone()),
            _ => Err(wrong_type(key)),
        })
        .unwrap_or_else(|| Ok(HashMap::new()))
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        self.with_entry(
            key,
            || Slot::SortedSet(HashMap::new()),
            |entry| match entry.slot {
                Slot::SortedSet(ref mut set) => {
                    set.insert(member.to_string(), score);
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        descending: bool,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        self.read(key, |e| match e.slot {
            Slot::SortedSet(ref set) => {
                let mut items = ordered(set);
                if descending {
                    items.reverse();
                }
                Ok(match rank_bounds(items.len(), start, stop) {
                    Some((from, to)) => items[from..=to].to_vec(),
                    None => Vec::new(),
                })
            }
            _ => Err(wrong_type(key)),
        })
        .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn sorted_set_trim_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<u64, CacheError> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(0);
        };
        if entry.is_expired() {
            return Ok(0);
        }
        match entry.slot {
            Slot::SortedSet(ref mut set) => {
                let items = ordered(set);
                let Some((from, to)) = rank_bounds(items.len(), start, stop) else {
                    return Ok(0);
                };
                for (member, _) in &items[from..=to] {
                    set.remove(member);
                }
                Ok((to - from + 1) as u64)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.with_entry(
            key,
            || Slot::Set(HashSet::new()),
            |entry| match entry.slot {
                Slot::Set(ref mut set) => Ok(set.insert(member.to_string())),
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64, CacheError> {
        self.read(key, |e| match e.slot {
            Slot::Set(ref set) => Ok(set.len() as u64),
            _ => Err(wrong_type(key)),
        })
        .unwrap_or(Ok(0))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
