//! Redis-backed shared cache, job queue, and the completion bridge.
//!
//! Key layout:
//! - `ticker:<SYMBOL>` holds the JSON of the latest analysis (`SET EX`)
//! - `queue:<name>:id` is the job id counter
//! - `queue:<name>:id:<job_id>` claims a job id for the dedup window (`SET NX EX`)
//! - `queue:<name>:wait` is the list the worker pops jobs from (`LPUSH`)
//!
//! The worker announces finished analyses on the `job-completed` channel; the
//! bridge fans those into the [`TopicHub`] so socket clients see them.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::Serialize;
use std::time::Duration;

use resolution_engine::TopicHub;
use ticker_core::{
    AnalysisResult, EnqueueOutcome, FlowError, JobQueue, JobRequest, ResultCache, ServerFrame,
    TickerSymbol, JOB_COMPLETED_EVENT,
};

pub const COMPLETION_CHANNEL: &str = JOB_COMPLETED_EVENT;

const BRIDGE_RETRY_DELAY: Duration = Duration::from_secs(5);

pub fn cache_key(symbol: &TickerSymbol) -> String {
    format!("ticker:{}", symbol)
}

pub async fn init_redis(redis_url: &str) -> anyhow::Result<(Client, ConnectionManager)> {
    let client = Client::open(redis_url).with_context(|| format!("Invalid REDIS_URL {}", redis_url))?;
    let manager = client
        .get_connection_manager()
        .await
        .context("Failed to connect to Redis")?;
    tracing::info!("Connected to Redis");
    Ok((client, manager))
}

fn cache_err(e: redis::RedisError) -> FlowError {
    FlowError::Cache(e.to_string())
}

fn queue_err(e: redis::RedisError) -> FlowError {
    FlowError::Queue(e.to_string())
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get_raw(&self, symbol: &TickerSymbol) -> Result<Option<String>, FlowError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(cache_key(symbol))
            .await
            .map_err(cache_err)
    }

    async fn put(&self, result: &AnalysisResult, ttl: Duration) -> Result<(), FlowError> {
        let payload = serde_json::to_string(result)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(cache_key(&result.ticker), payload, ttl.as_secs().max(1))
            .await
            .map_err(cache_err)
    }
}

/// What the worker pops off the wait list
#[derive(Debug, Serialize)]
pub struct QueuedJob<'a> {
    pub id: &'a str,
    pub name: &'static str,
    pub data: &'a JobRequest,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    queue_name: String,
    dedup_ttl: Duration,
}

impl RedisJobQueue {
    pub fn new(conn: ConnectionManager, queue_name: impl Into<String>, dedup_ttl: Duration) -> Self {
        Self {
            conn,
            queue_name: queue_name.into(),
            dedup_ttl,
        }
    }

    pub fn wait_key(&self) -> String {
        format!("queue:{}:wait", self.queue_name)
    }

    fn counter_key(&self) -> String {
        format!("queue:{}:id", self.queue_name)
    }

    pub fn id_key(&self, job_id: &str) -> String {
        format!("queue:{}:id:{}", self.queue_name, job_id)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<EnqueueOutcome, FlowError> {
        let mut conn = self.conn.clone();

        let job_id = match &job.job_id {
            Some(id) => id.clone(),
            None => conn
                .incr::<_, _, u64>(self.counter_key(), 1)
                .await
                .map_err(queue_err)?
                .to_string(),
        };

        let claimed: Option<String> = redis::cmd("SET")
            .arg(self.id_key(&job_id))
            .arg(job.kind.as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.dedup_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        if claimed.is_none() {
            tracing::debug!("Job {} already queued, skipping", job_id);
            return Ok(EnqueueOutcome::Deduplicated { job_id });
        }

        let payload = serde_json::to_string(&QueuedJob {
            id: &job_id,
            name: job.kind.as_str(),
            data: &job,
            enqueued_at: Utc::now(),
        })?;
        conn.lpush::<_, _, ()>(self.wait_key(), payload)
            .await
            .map_err(queue_err)?;

        tracing::info!("Queued {} job {} for {}", job.kind.as_str(), job_id, job.ticker);
        Ok(EnqueueOutcome::Queued { job_id })
    }
}

/// Route one message from the completion channel to the hub.
///
/// Accepts a `{event, topic, data}` frame or a bare analysis result. Returns
/// the number of listeners reached, or `None` when the message was unusable.
pub fn dispatch_completion(hub: &TopicHub, raw: &str) -> Option<usize> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Dropping non-JSON completion message: {}", e);
            return None;
        }
    };

    let data = match serde_json::from_value::<ServerFrame>(value.clone()) {
        Ok(frame) if frame.is_job_completed() => frame.data,
        Ok(frame) => {
            tracing::debug!("Ignoring {} event on completion channel", frame.event);
            return None;
        }
        Err(_) => value,
    };

    match AnalysisResult::from_value(data) {
        Ok(result) => hub.publish_completion(&result).ok(),
        Err(e) => {
            tracing::warn!("Dropping malformed completion: {}", e);
            None
        }
    }
}

async fn run_completion_bridge(client: &Client, hub: &TopicHub) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(COMPLETION_CHANNEL).await?;
    tracing::info!("Listening for worker completions on '{}'", COMPLETION_CHANNEL);

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        match msg.get_payload::<String>() {
            Ok(raw) => {
                dispatch_completion(hub, &raw);
            }
            Err(e) => tracing::warn!("Unreadable completion payload: {}", e),
        }
    }

    anyhow::bail!("completion subscription closed")
}

/// Keep the completion bridge alive, reconnecting after failures
pub fn spawn_completion_bridge(client: Client, hub: TopicHub) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = run_completion_bridge(&client, &hub).await {
                tracing::error!(
                    "Completion bridge failed: {}; retrying in {}s",
                    e,
                    BRIDGE_RETRY_DELAY.as_secs()
                );
            }
            tokio::time::sleep(BRIDGE_RETRY_DELAY).await;
        }
    })
}
