//! The broker proper: append-only sends, consumer-group fan-in, and the
//! dead-letter stream.

use std::future::Future;
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use ad_domain::config::RedisConfig;
use ad_domain::{Error, Result};

use crate::connect::RedisConnector;
use crate::envelope::{Envelope, EnvelopeError};

/// How long one XREADGROUP blocks before the listener loops again.
const BLOCK_MS: usize = 10_000;
/// Pause after a listener-level error before retrying the read loop.
const LISTENER_BACKOFF_SECS: u64 = 5;
/// Bounded retention of each dead-letter stream.
const DLQ_MAXLEN: usize = 1000;

pub fn dlq_topic(topic: &str) -> String {
    format!("{topic}-dlq")
}

fn group_for(topic: &str, group_id: Option<&str>) -> String {
    match group_id {
        Some(g) => g.to_string(),
        None => format!("{topic}_group"),
    }
}

fn from_redis(e: redis::RedisError) -> Error {
    Error::Broker(e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consumer options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Consumer-group name. Defaults to `{topic}_group`.
    pub group_id: Option<String>,
    /// Listener fibers reading from the stream.
    pub listeners: usize,
    /// Worker fibers per listener running the callback.
    pub workers_per_listener: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            group_id: None,
            listeners: 1,
            workers_per_listener: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Job<T> {
    message_id: String,
    envelope: Envelope<T>,
}

pub struct Broker {
    connector: Arc<RedisConnector>,
    /// Shared pipeline for sends, acks, and DLQ appends. Blocking reads
    /// never run on this connection.
    shared: MultiplexedConnection,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Broker {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let connector = Arc::new(RedisConnector::new(cfg)?);
        let shared = connector.connection().await?;
        Ok(Self {
            connector,
            shared,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Append a message to a topic. Never blocks on consumers; returns the
    /// stream entry id.
    pub async fn send<T>(&self, topic: &str, content: T) -> Result<String>
    where
        T: Serialize + DeserializeOwned,
    {
        let envelope = Envelope::new(content);
        let payload = envelope.to_json()?;
        let mut conn = self.shared.clone();
        let id: String = conn
            .xadd(topic, "*", &[("message", payload.as_str())])
            .await
            .map_err(from_redis)?;
        Ok(id)
    }

    /// Start consuming a topic: `listeners` reader fibers feed a bounded
    /// queue drained by `listeners x workers_per_listener` callback fibers.
    /// Delivery is at-least-once; failed callbacks park the envelope on
    /// `{topic}-dlq` and the original message is acked either way.
    pub async fn consumer<T, F, Fut>(
        &self,
        topic: &str,
        callback: F,
        options: ConsumerOptions,
    ) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let topic = topic.to_string();
        let group = group_for(&topic, options.group_id.as_deref());

        self.create_group(&topic, &group).await?;

        let (tx, rx) = mpsc::channel::<Job<T>>(options.workers_per_listener * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = self.handles.lock().await;
        for i in 0..options.listeners {
            let consumer_name = format!("{group}-listener-{}", i + 1);
            let conn = self.connector.connection().await?;
            handles.push(tokio::spawn(listen_loop(
                conn,
                topic.clone(),
                group.clone(),
                consumer_name.clone(),
                tx.clone(),
            )));

            for j in 0..options.workers_per_listener {
                let worker_name = format!("{consumer_name}-worker-{}", j + 1);
                handles.push(tokio::spawn(work_loop(
                    self.shared.clone(),
                    topic.clone(),
                    group.clone(),
                    worker_name,
                    rx.clone(),
                    callback.clone(),
                )));
            }
        }

        Ok(())
    }

    /// Idempotent consumer-group creation: a pre-existing group is fine.
    async fn create_group(&self, topic: &str, group: &str) -> Result<()> {
        let mut conn = self.shared.clone();
        let created: redis::RedisResult<String> =
            conn.xgroup_create_mkstream(topic, group, "$").await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(from_redis(e)),
        }
    }

    /// Cancel every listener and worker fiber and await them.
    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.iter() {
            handle.abort();
        }
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listener loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn listen_loop<T>(
    mut conn: MultiplexedConnection,
    topic: String,
    group: String,
    consumer_name: String,
    tx: mpsc::Sender<Job<T>>,
) where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    loop {
        let opts = StreamReadOptions::default()
            .group(&group, &consumer_name)
            .count(1)
            .block(BLOCK_MS);

        let reply: redis::RedisResult<StreamReadReply> =
            conn.xread_options(&[topic.as_str()], &[">"], &opts).await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    listener = %consumer_name,
                    error = %e,
                    "listener read error, backing off"
                );
                tokio::time::sleep(std::time::Duration::from_secs(LISTENER_BACKOFF_SECS)).await;
                continue;
            }
        };

        for key in reply.keys {
            for entry in key.ids {
                let raw: Option<String> = entry
                    .map
                    .get("message")
                    .and_then(|v| redis::from_redis_value(v).ok());

                let Some(raw) = raw else {
                    tracing::error!(
                        listener = %consumer_name,
                        message_id = %entry.id,
                        "stream entry without a message field"
                    );
                    continue;
                };

                match Envelope::<T>::from_json(&raw) {
                    Ok(envelope) => {
                        let job = Job {
                            message_id: entry.id.clone(),
                            envelope,
                        };
                        // Backpressure: when workers are saturated this
                        // send blocks, which stops the XREADGROUP pull.
                        if tx.send(job).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            listener = %consumer_name,
                            message_id = %entry.id,
                            error = %e,
                            "failed to parse envelope"
                        );
                    }
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn work_loop<T, F, Fut>(
    conn: MultiplexedConnection,
    topic: String,
    group: String,
    worker_name: String,
    rx: Arc<Mutex<mpsc::Receiver<Job<T>>>>,
    callback: F,
) where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            // Channel closed: the owning broker is gone.
            return;
        };

        let mut envelope = job.envelope;
        if let Err(err) = callback(envelope.content.clone()).await {
            tracing::error!(
                worker = %worker_name,
                message_id = %job.message_id,
                error = %err,
                "callback failed, parking envelope on DLQ"
            );
            envelope.exc_info = Some(EnvelopeError::from_error(&err));
            park_on_dlq(conn.clone(), &topic, &envelope).await;
        }

        // Ack even after failure so the envelope is not re-delivered; the
        // DLQ copy is the durable record of the failure.
        let mut ack_conn = conn.clone();
        let acked: redis::RedisResult<i64> = ack_conn
            .xack(&topic, &group, &[job.message_id.as_str()])
            .await;
        if let Err(e) = acked {
            tracing::error!(
                worker = %worker_name,
                message_id = %job.message_id,
                error = %e,
                "failed to ack message"
            );
        }
    }
}

async fn park_on_dlq<T: Serialize + DeserializeOwned>(
    mut conn: MultiplexedConnection,
    topic: &str,
    envelope: &Envelope<T>,
) {
    let payload = match envelope.to_json() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialise DLQ envelope");
            return;
        }
    };
    let appended: redis::RedisResult<String> = conn
        .xadd_maxlen(
            dlq_topic(topic),
            StreamMaxlen::Approx(DLQ_MAXLEN),
            "*",
            &[("message", payload.as_str())],
        )
        .await;
    if let Err(e) = appended {
        tracing::error!(error = %e, topic = %topic, "failed to append to DLQ");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_topic_suffix() {
        assert_eq!(dlq_topic("ready-tasks"), "ready-tasks-dlq");
    }

    #[test]
    fn default_group_derives_from_topic() {
        assert_eq!(group_for("ready-tasks", None), "ready-tasks_group");
        assert_eq!(group_for("ready-tasks", Some("custom")), "custom");
    }

    #[test]
    fn consumer_options_defaults() {
        let opts = ConsumerOptions::default();
        assert_eq!(opts.listeners, 1);
        assert_eq!(opts.workers_per_listener, 10);
        assert!(opts.group_id.is_none());
    }
}
