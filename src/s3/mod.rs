//! S3 bucket listing abstraction.
//!
//! Provides a trait-based abstraction over the two S3 lookups the deploy
//! wizard needs so the bucket cache can be tested without AWS:
//! - listing every bucket the account owns
//! - resolving the region a single bucket lives in

mod aws_cli;
mod cache;

pub use aws_cli::AwsCliS3Client;
pub use cache::{normalize_location, BucketChoices, BucketLookupPolicy, RegionBucketCache};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Errors specific to S3 lookups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S3Error {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("S3 is temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("bucket '{0}' not found")]
    NoSuchBucket(String),

    #[error("S3 command failed: {0}")]
    CommandFailed(String),

    #[error("unexpected S3 response: {0}")]
    Parse(String),
}

impl S3Error {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, S3Error::Unavailable(_))
    }
}

/// Trait abstracting S3 bucket lookups for testability
#[async_trait]
pub trait S3Client: Send + Sync {
    /// List every bucket owned by the account, in listing order.
    ///
    /// Bucket listing is account-wide, not region-scoped.
    async fn list_buckets(&self) -> Result<Vec<String>, S3Error>;

    /// Resolve the raw location constraint of a bucket.
    ///
    /// `None` (or an empty string) is the legacy encoding of `us-east-1`.
    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>, S3Error>;
}

/// Mock implementation for testing
#[derive(Default, Clone)]
pub struct MockS3Client {
    /// Buckets returned by `list_buckets`, in order
    pub buckets: Arc<Mutex<Vec<String>>>,
    /// Raw location constraint per bucket; buckets absent here resolve to `None`
    pub locations: Arc<Mutex<HashMap<String, Option<String>>>>,
    /// Errors returned by successive `list_buckets` calls before succeeding
    pub list_failures: Arc<Mutex<Vec<S3Error>>>,
    /// Buckets whose location lookup always fails
    pub failing_lookups: Arc<Mutex<HashMap<String, S3Error>>>,
    /// Buckets whose location lookup stalls for the given duration
    pub slow_lookups: Arc<Mutex<HashMap<String, Duration>>>,
    /// Number of `list_buckets` calls made
    pub list_calls: Arc<Mutex<usize>>,
    /// Buckets passed to `get_bucket_location`, in call order
    pub location_calls: Arc<Mutex<Vec<String>>>,
}

impl MockS3Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bucket with its raw location constraint
    pub fn with_bucket(self, name: &str, location: Option<&str>) -> Self {
        self.buckets.lock().unwrap().push(name.to_string());
        self.locations
            .lock()
            .unwrap()
            .insert(name.to_string(), location.map(str::to_string));
        self
    }

    /// Make the next `list_buckets` call fail with `err`
    pub fn fail_next_listing(self, err: S3Error) -> Self {
        self.list_failures.lock().unwrap().push(err);
        self
    }

    /// Make every location lookup for `bucket` fail with `err`
    pub fn fail_lookup(self, bucket: &str, err: S3Error) -> Self {
        self.failing_lookups
            .lock()
            .unwrap()
            .insert(bucket.to_string(), err);
        self
    }

    /// Make every location lookup for `bucket` stall for `delay`
    pub fn slow_lookup(self, bucket: &str, delay: Duration) -> Self {
        self.slow_lookups
            .lock()
            .unwrap()
            .insert(bucket.to_string(), delay);
        self
    }

    pub fn list_call_count(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn location_call_count(&self, bucket: &str) -> usize {
        self.location_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.as_str() == bucket)
            .count()
    }
}

#[async_trait]
impl S3Client for MockS3Client {
    async fn list_buckets(&self) -> Result<Vec<String>, S3Error> {
        *self.list_calls.lock().unwrap() += 1;

        let failure = {
            let mut failures = self.list_failures.lock().unwrap();
            if failures.is_empty() {
                None
            } else {
                Some(failures.remove(0))
            }
        };
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(self.buckets.lock().unwrap().clone())
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>, S3Error> {
        self.location_calls.lock().unwrap().push(bucket.to_string());

        let delay = self.slow_lookups.lock().unwrap().get(bucket).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.failing_lookups.lock().unwrap().get(bucket) {
            return Err(err.clone());
        }

        self.locations
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .ok_or_else(|| S3Error::NoSuchBucket(bucket.to_string()))
    }
}
