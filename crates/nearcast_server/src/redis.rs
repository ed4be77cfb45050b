//! Redis-backed implementations of the core store and broker contracts.
//! The key-value side runs on a multiplexed connection; the pub/sub side
//! splits one dedicated connection into a command sink and a message
//! stream, so plane operations and the receive loop never contend for it.

use async_trait::async_trait;
use futures::StreamExt;
use nearcast_core::{CoreError, KeyValueStore, PubSub};
use redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};
use redis::AsyncCommands;
use tokio::sync::Mutex;

fn store_err(e: redis::RedisError) -> CoreError {
    CoreError::Store(e.to_string())
}

fn broker_err(e: redis::RedisError) -> CoreError {
    CoreError::Broker(e.to_string())
}

/// SETEX/GET over one multiplexed Redis connection.
pub struct RedisKv {
    conn: MultiplexedConnection,
}

impl RedisKv {
    /// Connect and verify the server answers a PING.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(RedisKv { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn setex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await.map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_err)
    }
}

/// One Redis pub/sub connection plus a publishing side.
pub struct RedisPubSub {
    publisher: MultiplexedConnection,
    sink: Mutex<PubSubSink>,
    stream: Mutex<PubSubStream>,
}

impl RedisPubSub {
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(url).map_err(broker_err)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(broker_err)?;
        let (sink, stream) = client
            .get_async_pubsub()
            .await
            .map_err(broker_err)?
            .split();
        Ok(RedisPubSub {
            publisher,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), CoreError> {
        let mut conn = self.publisher.clone();
        let _: i64 = conn.publish(channel, payload).await.map_err(broker_err)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.sink
            .lock()
            .await
            .subscribe(channel)
            .await
            .map_err(broker_err)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.sink
            .lock()
            .await
            .unsubscribe(channel)
            .await
            .map_err(broker_err)
    }

    async fn receive(&self) -> Result<(String, Vec<u8>), CoreError> {
        let mut stream = self.stream.lock().await;
        match stream.next().await {
            Some(msg) => Ok((
                msg.get_channel_name().to_string(),
                msg.get_payload_bytes().to_vec(),
            )),
            None => Err(CoreError::Broker("pub/sub connection closed".to_string())),
        }
    }
}
