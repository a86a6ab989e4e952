use std::time::{Duration, SystemTime};

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

/// One key-value pair. `expires_at` feeds the collection's TTL index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEntryDocument {
    #[serde(rename = "_id")]
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime>,
}

impl MongoEntryDocument {
    pub fn new(key: String, value: String, ttl: Option<Duration>, now: SystemTime) -> Self {
        Self {
            key,
            value,
            expires_at: ttl.map(|ttl| DateTime::from_system_time(now + ttl)),
        }
    }

    /// MongoDB only sweeps TTL indexes about once a minute, so expiry is re-checked on read.
    pub fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at
            .is_none_or(|deadline| deadline.to_system_time() > now)
    }
}

pub fn key_filter(key: &str) -> Document {
    doc! {"_id": key}
}
