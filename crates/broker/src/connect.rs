//! Redis connection handling: direct URL or sentinel-resolved master.

use redis::aio::MultiplexedConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::RedisConnectionInfo;
use tokio::sync::Mutex;

use ad_domain::config::RedisConfig;
use ad_domain::{Error, Result};

fn from_redis(e: redis::RedisError) -> Error {
    Error::Broker(e.to_string())
}

/// Hands out async connections. Listeners take dedicated connections so
/// their blocking stream reads never stall the shared pipeline.
pub enum RedisConnector {
    Url(redis::Client),
    Sentinel(Mutex<SentinelClient>),
}

impl RedisConnector {
    pub fn new(cfg: &RedisConfig) -> Result<Self> {
        if let Some(url) = &cfg.url {
            let client = redis::Client::open(url.as_str()).map_err(from_redis)?;
            return Ok(Self::Url(client));
        }

        let sentinels: Vec<String> = cfg
            .sentinels
            .iter()
            .map(|addr| match &cfg.sentinel_password {
                Some(pw) => format!("redis://:{pw}@{addr}"),
                None => format!("redis://{addr}"),
            })
            .collect();

        let node_info = SentinelNodeConnectionInfo {
            tls_mode: None,
            redis_connection_info: Some(RedisConnectionInfo {
                db: cfg.db,
                username: None,
                password: cfg.password.clone(),
                ..Default::default()
            }),
        };

        let client = SentinelClient::build(
            sentinels,
            cfg.master_name.clone(),
            Some(node_info),
            SentinelServerType::Master,
        )
        .map_err(from_redis)?;

        Ok(Self::Sentinel(Mutex::new(client)))
    }

    /// Open a fresh multiplexed connection.
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        match self {
            Self::Url(client) => client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(from_redis),
            Self::Sentinel(client) => {
                let mut client = client.lock().await;
                client.get_async_connection().await.map_err(from_redis)
            }
        }
    }
}
