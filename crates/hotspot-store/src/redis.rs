//! Redis snapshot reads and pub/sub subscriptions.
//!
//! Two connections are used: a regular [`Client`] for snapshot and stream
//! list reads, and a [`SubscriberClient`] that only carries subscriptions.
//! Subscriptions are re-established automatically after a reconnect.

use std::collections::BTreeMap;

use fred::clients::SubscriberClient;
use fred::prelude::*;
use hotspot_core::Subscription;
use hotspot_core::config::RedisConfig;
use hotspot_types::StorageKind;
use tokio::sync::broadcast;

use crate::error::StoreError;

fn client_config(config: &RedisConfig) -> Result<Config, StoreError> {
    let mut client_config = Config::from_url(&config.url)
        .map_err(|e| StoreError::Config(format!("Invalid Redis URL: {e}")))?;
    if config.database != 0 {
        client_config.database = Some(config.database);
    }
    Ok(client_config)
}

/// Read side of the store: snapshots and the stream list.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// Connect using the `redis` section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Redis`] if the connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Builder::from_config(client_config(config)?).build()?;
        client.init().await?;

        tracing::info!(url = config.url.as_str(), "Connected to Redis");
        Ok(Self { client })
    }

    /// Known stream identifiers, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the read fails.
    pub async fn list_streams(&self, list_key: &str) -> Result<Vec<String>, StoreError> {
        let streams: Vec<String> = self.client.lrange(list_key, 0, -1).await?;
        Ok(streams)
    }

    /// Every payload stored under `key`, read according to `storage`.
    ///
    /// Hash entries are returned in field order, list entries in list
    /// order. A missing key yields no payloads.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the read fails, or
    /// [`StoreError::UnexpectedValue`] if an entry is not a byte payload.
    pub async fn snapshot(&self, key: &str, storage: StorageKind) -> Result<Vec<Vec<u8>>, StoreError> {
        let values: Vec<Value> = match storage {
            StorageKind::Hash => {
                // Field names are arbitrary bytes, so the reply is read as a
                // raw map and ordered by field bytes.
                let reply: Value = self.client.hgetall(key).await?;
                let entries: BTreeMap<Vec<u8>, Value> = reply
                    .into_map()?
                    .inner()
                    .into_iter()
                    .map(|(field, value)| (field.as_bytes().to_vec(), value))
                    .collect();
                entries.into_values().collect()
            }
            StorageKind::List => self.client.lrange(key, 0, -1).await?,
            StorageKind::Value => {
                let value: Value = self.client.get(key).await?;
                if value.is_null() { Vec::new() } else { vec![value] }
            }
            StorageKind::None => Vec::new(),
        };
        values
            .into_iter()
            .map(|value| {
                value
                    .as_bytes()
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| StoreError::UnexpectedValue {
                        key: key.to_owned(),
                        kind: format!("{:?}", value.kind()),
                    })
            })
            .collect()
    }

    /// Publish a payload. Used by producers and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the publish fails.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let _: i64 = self.client.publish(channel, payload).await?;
        Ok(())
    }

    /// Append a payload to a list snapshot. Used by producers and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the write fails.
    pub async fn push(&self, key: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let _: i64 = self.client.rpush(key, payload).await?;
        Ok(())
    }

    /// Write one field of a hash snapshot. Used by producers and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the write fails.
    pub async fn hash_set(&self, key: &str, field: Vec<u8>, payload: Vec<u8>) -> Result<(), StoreError> {
        let _: i64 = self.client.hset(key, (field.as_slice(), payload)).await?;
        Ok(())
    }

    /// Replace a single-value snapshot. Used by producers and tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the write fails.
    pub async fn set_value(&self, key: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let _: () = self.client.set(key, payload, None, None, false).await?;
        Ok(())
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }
}

/// Pub/sub side of the store.
#[derive(Clone)]
pub struct Subscriber {
    client: SubscriberClient,
}

impl Subscriber {
    /// Connect a dedicated subscriber connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Redis`] if the connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let capacity = config.broadcast_capacity;
        let mut builder = Builder::from_config(client_config(config)?);
        builder.with_performance_config(|perf| {
            perf.broadcast_channel_capacity = capacity;
        });
        let client = builder.build_subscriber_client()?;
        client.init().await?;
        let _resubscribe = client.manage_subscriptions();

        tracing::info!(url = config.url.as_str(), "Subscriber connected");
        Ok(Self { client })
    }

    /// A fresh receiver for messages on every subscription.
    ///
    /// Only messages published after this call are delivered to it.
    pub fn messages(&self) -> broadcast::Receiver<fred::types::Message> {
        self.client.message_rx()
    }

    /// Subscribe to every channel and pattern in `subscriptions`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if a subscription fails.
    pub async fn subscribe(&self, subscriptions: &[Subscription]) -> Result<(), StoreError> {
        for subscription in subscriptions {
            match subscription {
                Subscription::Exact(channel) => {
                    self.client.subscribe(channel.as_str()).await?;
                    tracing::debug!(channel = channel.as_str(), "Subscribed");
                }
                Subscription::Pattern(pattern) => {
                    self.client.psubscribe(pattern.as_str()).await?;
                    tracing::debug!(pattern = pattern.as_str(), "Pattern subscribed");
                }
            }
        }
        Ok(())
    }

    /// Drop every channel and pattern subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the unsubscribe fails.
    pub async fn unsubscribe_all(&self) -> Result<(), StoreError> {
        self.client.unsubscribe_all().await?;
        Ok(())
    }
}
