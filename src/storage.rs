//! Storage layer (R2/S3).
//!
//! Every record is one JSON object in the bucket: groups and channels keyed
//! by chat id, the relay ledger keyed by (source chat, source message), and
//! like ballots keyed by the relayed copy. Group reads go through a
//! short-TTL cache since every tagged message and edit loads the same
//! configuration.

use crate::config::Settings;
use crate::likes::LikeBallot;
use crate::models::{Channel, Group, RelayRecord};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use moka::future::Cache;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Group-config cache TTL. Tag bindings and settings rarely change; a stale
/// read only delays a new binding by this long.
const GROUP_CACHE_TTL_SECS: u64 = 30;
const GROUP_CACHE_MAX_SIZE: u64 = 10_000;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    #[error("S3 put error: {0}")]
    S3Put(String),
    #[error("S3 list error: {0}")]
    S3List(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub struct R2Storage {
    client: Client,
    bucket: String,
    group_cache: Cache<i64, Group>,
}

impl R2Storage {
    /// Create a new R2 storage instance
    ///
    /// # Errors
    ///
    /// Returns an error if R2 configuration is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StorageError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StorageError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "r2-storage");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        let group_cache = Cache::builder()
            .max_capacity(GROUP_CACHE_MAX_SIZE)
            .time_to_live(Duration::from_secs(GROUP_CACHE_TTL_SECS))
            .build();

        Ok(Self {
            client,
            bucket: bucket.clone(),
            group_cache,
        })
    }

    /// Save data as JSON to R2
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization or S3 upload fails.
    pub async fn save_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        data: &T,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(data)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.into_bytes()))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StorageError::S3Put(e.to_string()))?;

        Ok(())
    }

    /// Load data from JSON in R2
    ///
    /// # Errors
    ///
    /// Returns an error if S3 download or JSON deserialization fails.
    pub async fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;
                let json_data = serde_json::from_slice(&data.into_bytes())?;
                Ok(Some(json_data))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StorageError::S3Get(Box::new(e))),
        }
    }

    // --- Group Functions ---

    /// Load a group's relay configuration, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    pub async fn get_group(&self, chat_id: i64) -> Result<Option<Group>, StorageError> {
        if let Some(group) = self.group_cache.get(&chat_id).await {
            return Ok(Some(group));
        }
        let group: Option<Group> = self.load_json(&group_key(chat_id)).await?;
        if let Some(group) = &group {
            self.group_cache.insert(chat_id, group.clone()).await;
        }
        Ok(group)
    }

    /// Persist a group and drop its cache entry.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        self.save_json(&group_key(group.chat_id), group).await?;
        self.group_cache.invalidate(&group.chat_id).await;
        Ok(())
    }

    /// Bind a tag to a destination channel, creating the group record on the
    /// first binding.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving fails.
    pub async fn bind_tag(
        &self,
        chat_id: i64,
        tag: &str,
        channel_id: i64,
    ) -> Result<(), StorageError> {
        let mut group = self
            .get_group(chat_id)
            .await?
            .unwrap_or_else(|| Group::new(chat_id));
        group.bind(tag, channel_id);
        self.save_group(&group).await
    }

    // --- Channel Functions ---

    /// Load a destination channel record.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    pub async fn get_channel(&self, chat_id: i64) -> Result<Option<Channel>, StorageError> {
        self.load_json(&channel_key(chat_id)).await
    }

    /// Persist a destination channel record.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn save_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        self.save_json(&channel_key(channel.chat_id), channel).await
    }

    /// Load every known destination channel record. Backs the `/watch`
    /// channel picker; the channel set is small enough to page through.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or loading fails.
    pub async fn list_channels(&self) -> Result<Vec<Channel>, StorageError> {
        let mut channels = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix("channels/");
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| StorageError::S3List(e.to_string()))?;
            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                if let Some(channel) = self.load_json::<Channel>(key).await? {
                    channels.push(channel);
                }
            }
            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_owned()),
                None => break,
            }
        }
        Ok(channels)
    }

    // --- Relay Ledger Functions ---

    /// Append one relay record. The ledger is append-only; a fallback
    /// re-relay adds a fresh record next to the stale one.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or saving the ledger page fails.
    pub async fn append_relay(&self, record: &RelayRecord) -> Result<(), StorageError> {
        let key = relay_key(record.chat_id, record.message_id);
        let mut records: Vec<RelayRecord> = self.load_json(&key).await?.unwrap_or_default();
        records.push(record.clone());
        self.save_json(&key, &records).await
    }

    /// All relay records for one source message, in append order. Unknown
    /// keys yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    pub async fn get_relays(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Vec<RelayRecord>, StorageError> {
        Ok(self
            .load_json(&relay_key(chat_id, message_id))
            .await?
            .unwrap_or_default())
    }

    // --- Like Ballot Functions ---

    /// Load the like ballot for a relayed copy, empty if nobody voted yet.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails.
    pub async fn get_ballot(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<LikeBallot, StorageError> {
        Ok(self
            .load_json(&ballot_key(chat_id, message_id))
            .await?
            .unwrap_or_default())
    }

    /// Persist a like ballot.
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub async fn save_ballot(
        &self,
        chat_id: i64,
        message_id: i32,
        ballot: &LikeBallot,
    ) -> Result<(), StorageError> {
        self.save_json(&ballot_key(chat_id, message_id), ballot)
            .await
    }

    /// Check connection to R2 storage
    ///
    /// # Errors
    ///
    /// Returns an error if listing buckets fails.
    pub async fn check_connection(&self) -> Result<(), String> {
        match self.client.list_buckets().send().await {
            Ok(_) => {
                info!("Successfully connected to R2 storage.");
                Ok(())
            }
            Err(e) => {
                let err_msg = format!("R2 connectivity test failed: {e:#?}");
                error!("{}", err_msg);
                Err(err_msg)
            }
        }
    }
}

#[must_use]
pub fn group_key(chat_id: i64) -> String {
    format!("groups/{chat_id}.json")
}

#[must_use]
pub fn channel_key(chat_id: i64) -> String {
    format!("channels/{chat_id}.json")
}

#[must_use]
pub fn relay_key(chat_id: i64, message_id: i32) -> String {
    format!("relays/{chat_id}/{message_id}.json")
}

#[must_use]
pub fn ballot_key(chat_id: i64, message_id: i32) -> String {
    format!("likes/{chat_id}/{message_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(group_key(-1001234), "groups/-1001234.json");
        assert_eq!(channel_key(42), "channels/42.json");
        assert_eq!(relay_key(-1001234, 17), "relays/-1001234/17.json");
        assert_eq!(ballot_key(-1009999, 3), "likes/-1009999/3.json");
    }
}
