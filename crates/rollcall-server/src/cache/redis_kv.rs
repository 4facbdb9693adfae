//! Redis-backed [`KvCache`] over a deadpool connection pool.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, FromRedisValue};

use super::kv::{CacheError, KvCache};

/// Shared Redis cache. Every command is bounded by the configured timeout.
#[derive(Clone)]
pub struct RedisKv {
    pool: Pool,
    timeout: Duration,
}

impl RedisKv {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn query<T>(&self, cmd: redis::Cmd) -> Result<T, CacheError>
    where
        T: FromRedisValue + Send,
    {
        self.bounded(async {
            let mut conn = self.conn().await?;
            Ok(cmd.query_async::<T>(&mut conn).await?)
        })
        .await
    }
}

/// Redis rejects `SETEX`/`EXPIRE` with 0 seconds.
fn whole_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvCache for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            Ok(conn.get::<_, Option<String>>(key).await?)
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.set_ex::<_, _, ()>(key, value, whole_secs(ttl)).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded(async {
            let mut conn = self.conn().await?;
            Ok(conn.del::<_, u64>(keys).await?)
        })
        .await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), CacheError> {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1));
        self.query(cmd).await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(by);
        self.query(cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(whole_secs(ttl));
        self.query(cmd).await
    }

    async fn hash_increment(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        let mut cmd = redis::cmd("HINCRBY");
        cmd.arg(key).arg(field).arg(by);
        self.query(cmd).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, CacheError> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        let _added: i64 = self.query(cmd).await?;
        Ok(())
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        descending: bool,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        let mut cmd = redis::cmd(if descending { "ZREVRANGE" } else { "ZRANGE" });
        cmd.arg(key).arg(start).arg(stop).arg("WITHSCORES");
        self.query(cmd).await
    }

    async fn sorted_set_trim_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<u64, CacheError> {
        let mut cmd = redis::cmd("ZREMRANGEBYRANK");
        cmd.arg(key).arg(start).arg(stop);
        self.query(cmd).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        let added: u64 = self.query(cmd).await?;
        Ok(added > 0)
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64, CacheError> {
        let mut cmd = redis::cmd("SCARD");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self.query(redis::cmd("PING")).await?;
        if pong.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(CacheError::Command(format!("unexpected PING reply: {pong}")))
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_secs_never_zero() {
        assert_eq!(whole_secs(Duration::from_millis(200)), 1);
        assert_eq!(whole_secs(Duration::from_secs(300)), 300);
    }
}
