use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::services::store::JobStore;
use crate::{Job, JobCounts, JobQueueError, QueueName};

// KEYS: job hash, due. ARGV: data, due score, key.
const ADD_SCRIPT: &str = r#"
if redis.call('HSETNX', KEYS[1], 'data', ARGV[1]) == 0 then
  return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
return 1
"#;

// KEYS: due, job hash. ARGV: key.
const REMOVE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
  return 0
end
redis.call('DEL', KEYS[2])
return 1
"#;

// KEYS: active, due. ARGV: now.
const RECOVER_SCRIPT: &str = r#"
local stalled = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, key in ipairs(stalled) do
  redis.call('ZREM', KEYS[1], key)
  redis.call('ZADD', KEYS[2], ARGV[1], key)
end
return #stalled
"#;

// KEYS: due, active. ARGV: now, lease deadline, job hash prefix.
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #due == 0 then
  return false
end
local key = due[1]
redis.call('ZREM', KEYS[1], key)
local data = redis.call('HGET', ARGV[3] .. key, 'data')
if not data then
  return false
end
redis.call('ZADD', KEYS[2], ARGV[2], key)
return data
"#;

// KEYS: job hash, active, due. ARGV: data, due score, key.
const RESCHEDULE_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], 'data', ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[3])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[3])
return 1
"#;

// KEYS: job hash, active, completed. ARGV: key, completed at, retention.
const COMPLETE_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[1])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[1])
redis.call('ZREMRANGEBYRANK', KEYS[3], 0, -(tonumber(ARGV[3]) + 1))
return 1
"#;

// KEYS: job hash, active, failed. ARGV: key, data, retention.
const FAIL_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[1])
redis.call('LPUSH', KEYS[3], ARGV[2])
redis.call('LTRIM', KEYS[3], 0, tonumber(ARGV[3]) - 1)
return 1
"#;

struct Scripts {
    add: Script,
    remove: Script,
    recover: Script,
    claim: Script,
    reschedule: Script,
    complete: Script,
    fail: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            add: Script::new(ADD_SCRIPT),
            remove: Script::new(REMOVE_SCRIPT),
            recover: Script::new(RECOVER_SCRIPT),
            claim: Script::new(CLAIM_SCRIPT),
            reschedule: Script::new(RESCHEDULE_SCRIPT),
            complete: Script::new(COMPLETE_SCRIPT),
            fail: Script::new(FAIL_SCRIPT),
        }
    }
}

/// Redis-backed `JobStore`.
///
/// Per queue: one hash per job (`{prefix}:{queue}:job:{key}`), a sorted set of
/// due times and a sorted set of active keys scored by lease deadline, both in
/// epoch millis. Completed keys go to a capped sorted set, failed jobs to a
/// capped list. Every state change runs as a single Lua script.
pub struct RedisJobStore {
    pool: Pool,
    prefix: String,
    lease: Duration,
    failed_retention: usize,
    completed_retention: usize,
    scripts: Scripts,
}

impl RedisJobStore {
    pub async fn new(config: &AppConfig) -> Result<Self, JobQueueError> {
        let redis_url = config.redis_url.clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| JobQueueError::PoolError(format!("Pool creation error: {}", e)))?;

        let mut conn = pool.get().await
            .map_err(|e| JobQueueError::PoolError(format!("Connection error: {}", e)))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis queue service initialized successfully");

        let store = Self {
            pool,
            prefix: config.redis_key_prefix.clone(),
            lease: Duration::seconds(i64::try_from(config.job_lease_seconds.max(1)).unwrap_or(i64::MAX)),
            failed_retention: config.failed_job_retention.max(1),
            completed_retention: config.completed_job_retention.max(1),
            scripts: Scripts::load(),
        };

        let now = Utc::now();
        for queue in QueueName::ALL {
            store.recover_stalled(queue, now).await?;
        }

        Ok(store)
    }

    fn job_key(&self, queue: QueueName, key: &str) -> String {
        format!("{}{}", self.job_prefix(queue), key)
    }

    fn job_prefix(&self, queue: QueueName) -> String {
        format!("{}:{}:job:", self.prefix, queue)
    }

    fn due_key(&self, queue: QueueName) -> String {
        format!("{}:{}:due", self.prefix, queue)
    }

    fn active_key(&self, queue: QueueName) -> String {
        format!("{}:{}:active", self.prefix, queue)
    }

    fn completed_key(&self, queue: QueueName) -> String {
        format!("{}:{}:completed", self.prefix, queue)
    }

    fn failed_key(&self, queue: QueueName) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    async fn get_connection(&self) -> Result<Connection, JobQueueError> {
        self.pool.get().await
            .map_err(|e| JobQueueError::PoolError(e.to_string()))
    }

    async fn reschedule(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        let mut conn = self.get_connection().await?;
        let mut updated = job.clone();
        updated.not_before = not_before;
        let job_data = serde_json::to_string(&updated)?;

        let _: i64 = self.scripts.reschedule
            .key(self.job_key(job.queue, &job.key))
            .key(self.active_key(job.queue))
            .key(self.due_key(job.queue))
            .arg(job_data)
            .arg(not_before.timestamp_millis())
            .arg(&job.key)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn add(&self, job: Job) -> Result<bool, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let job_data = serde_json::to_string(&job)?;

        let added: i64 = self.scripts.add
            .key(self.job_key(job.queue, &job.key))
            .key(self.due_key(job.queue))
            .arg(job_data)
            .arg(job.not_before.timestamp_millis())
            .arg(&job.key)
            .invoke_async(&mut conn)
            .await?;

        if added == 0 {
            debug!("Job {} already live on {}", job.key, job.queue);
            return Ok(false);
        }

        debug!("Job {} enqueued on {} for {}", job.key, job.queue, job.not_before);
        Ok(true)
    }

    async fn get(&self, queue: QueueName, key: &str) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let job_data: Option<String> = conn.hget(self.job_key(queue, key), "data").await?;

        match job_data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError> {
        let mut conn = self.get_connection().await?;

        let removed: i64 = self.scripts.remove
            .key(self.due_key(queue))
            .key(self.job_key(queue, key))
            .arg(key)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            return Ok(false);
        }
        debug!("Job {} removed from {}", key, queue);
        Ok(true)
    }

    async fn claim_due(&self, queue: QueueName, now: DateTime<Utc>) -> Result<Option<Job>, JobQueueError> {
        self.recover_stalled(queue, now).await?;

        let mut conn = self.get_connection().await?;
        let job_data: Option<String> = self.scripts.claim
            .key(self.due_key(queue))
            .key(self.active_key(queue))
            .arg(now.timestamp_millis())
            .arg((now + self.lease).timestamp_millis())
            .arg(self.job_prefix(queue))
            .invoke_async(&mut conn)
            .await?;

        match job_data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn recover_stalled(&self, queue: QueueName, now: DateTime<Utc>) -> Result<usize, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let recovered: usize = self.scripts.recover
            .key(self.active_key(queue))
            .key(self.due_key(queue))
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        if recovered > 0 {
            warn!("Recovered {} stalled jobs on {}", recovered, queue);
        }
        Ok(recovered)
    }

    async fn complete(&self, job: &Job, now: DateTime<Utc>) -> Result<(), JobQueueError> {
        let mut conn = self.get_connection().await?;
        let _: i64 = self.scripts.complete
            .key(self.job_key(job.queue, &job.key))
            .key(self.active_key(job.queue))
            .key(self.completed_key(job.queue))
            .arg(&job.key)
            .arg(now.timestamp_millis())
            .arg(self.completed_retention)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn was_completed(&self, queue: QueueName, key: &str) -> Result<bool, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let score: Option<f64> = conn.zscore(self.completed_key(queue), key).await?;
        Ok(score.is_some())
    }

    async fn retry(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        self.reschedule(job, not_before).await
    }

    async fn repeat(&self, job: &Job, not_before: DateTime<Utc>) -> Result<(), JobQueueError> {
        let mut fresh = job.clone();
        fresh.attempts = 0;
        fresh.last_error = None;
        self.reschedule(&fresh, not_before).await
    }

    async fn fail(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut conn = self.get_connection().await?;
        let job_data = serde_json::to_string(job)?;

        let _: i64 = self.scripts.fail
            .key(self.job_key(job.queue, &job.key))
            .key(self.active_key(job.queue))
            .key(self.failed_key(job.queue))
            .arg(&job.key)
            .arg(job_data)
            .arg(self.failed_retention)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn failed(&self, queue: QueueName, limit: usize) -> Result<Vec<Job>, JobQueueError> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let mut conn = self.get_connection().await?;
        let rows: Vec<String> = conn.lrange(self.failed_key(queue), 0, limit as isize - 1).await?;

        let jobs = rows.iter()
            .map(|row| serde_json::from_str(row))
            .collect::<std::result::Result<Vec<Job>, _>>()?;
        Ok(jobs)
    }

    async fn counts(&self, queue: QueueName, now: DateTime<Utc>) -> Result<JobCounts, JobQueueError> {
        let mut conn = self.get_connection().await?;
        let due_key = self.due_key(queue);
        let now_ms = now.timestamp_millis();

        let waiting: u64 = conn.zcount(&due_key, "-inf", now_ms).await?;
        let delayed: u64 = conn.zcount(&due_key, format!("({}", now_ms), "+inf").await?;
        let active: u64 = conn.zcard(self.active_key(queue)).await?;
        let failed: u64 = conn.llen(self.failed_key(queue)).await?;

        Ok(JobCounts { waiting, delayed, active, failed })
    }
}
