//! Redis编排锁
//!
//! 多实例部署下的按键互斥（发布推进、配置排期共用一套锁）：
//! `SET NX PX` 抢占，Lua脚本保证只有持有者能释放。TTL兜底防止
//! 实例崩溃后锁永久滞留。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::debug;

use orchestrator_domain::ReleaseLock;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

pub struct RedisReleaseLock {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisReleaseLock {
    pub async fn connect(url: &str) -> OrchestratorResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| OrchestratorError::config_error(format!("Redis地址无效: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| OrchestratorError::Network(format!("Redis连接失败: {e}")))?;
        Ok(Self {
            conn,
            key_prefix: "orchestrator:lock:".to_string(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl ReleaseLock for RedisReleaseLock {
    async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> OrchestratorResult<bool> {
        let mut conn = self.conn.clone();
        let redis_key = self.prefixed(key);
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let set: Option<String> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::Network(format!("Redis SET失败: {e}")))?;
        if set.is_some() {
            debug!(key, owner, "已获取编排锁");
            return Ok(true);
        }

        // 同一持有者重入视为刷新TTL
        let holder: Option<String> = redis::cmd("GET")
            .arg(&redis_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::Network(format!("Redis GET失败: {e}")))?;
        if holder.as_deref() == Some(owner) {
            let _: bool = redis::cmd("PEXPIRE")
                .arg(&redis_key)
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|e| OrchestratorError::Network(format!("Redis PEXPIRE失败: {e}")))?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn release(&self, key: &str, owner: &str) -> OrchestratorResult<()> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(self.prefixed(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::Network(format!("Redis释放锁失败: {e}")))?;
        if released == 0 {
            debug!(key, owner, "锁已不属于当前持有者，跳过释放");
        }
        Ok(())
    }
}
