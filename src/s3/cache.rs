//! Per-run cache of bucket names grouped by region.
//!
//! Listing buckets is account-wide, so one listing fills every region at
//! once. Each bucket's region is then resolved with its own lookup; the
//! lookups run concurrently and each one carries its own timeout and retry
//! budget so a single stalled bucket cannot hold up the rest.

use backon::{ExponentialBuilder, Retryable};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{S3Client, S3Error};

/// Region reported for buckets with an empty location constraint
pub const DEFAULT_BUCKET_REGION: &str = "us-east-1";

/// Legacy location constraint still returned for some Ireland buckets
pub const LEGACY_EU_LOCATION: &str = "EU";

/// Region the legacy `EU` constraint stands for
pub const EU_BUCKET_REGION: &str = "eu-west-1";

/// Map a raw S3 location constraint to a region code.
///
/// See <https://docs.aws.amazon.com/general/latest/gr/rande.html#s3_region>
pub fn normalize_location(location: Option<&str>) -> String {
    match location {
        None => DEFAULT_BUCKET_REGION.to_string(),
        Some(loc) if loc.trim().is_empty() => DEFAULT_BUCKET_REGION.to_string(),
        Some(LEGACY_EU_LOCATION) => EU_BUCKET_REGION.to_string(),
        Some(loc) => loc.to_string(),
    }
}

/// Timeout and retry budget for a single bucket-region lookup
#[derive(Debug, Clone)]
pub struct BucketLookupPolicy {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for BucketLookupPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl BucketLookupPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.timeout)
            .with_max_times(self.max_retries)
    }
}

/// What the bucket prompt should offer for a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketChoices {
    /// Bucket names in the region, sorted
    Available(Vec<String>),
    /// Nothing to pick; `message` (and the raw error in `detail`) is shown
    /// as the only item, and picking it means going back
    Unavailable {
        message: String,
        detail: Option<String>,
    },
}

impl BucketChoices {
    /// Hint shown next to the fallback item
    pub const GO_BACK_HINT: &'static str = "Go back to region selection...";

    pub fn buckets(&self) -> &[String] {
        match self {
            BucketChoices::Available(buckets) => buckets,
            BucketChoices::Unavailable { .. } => &[],
        }
    }

    /// Whether `bucket` is one of the offered buckets
    pub fn contains(&self, bucket: &str) -> bool {
        self.buckets().iter().any(|b| b == bucket)
    }
}

/// Bucket names keyed by region, filled at most once per wizard run
#[derive(Debug, Default)]
pub struct RegionBucketCache {
    buckets_by_region: HashMap<String, Vec<String>>,
    populated: bool,
    policy: BucketLookupPolicy,
}

impl RegionBucketCache {
    pub fn new(policy: BucketLookupPolicy) -> Self {
        Self {
            buckets_by_region: HashMap::new(),
            populated: false,
            policy,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// List and group every bucket, unless that already happened.
    ///
    /// A failed listing leaves the cache unpopulated so a later call tries
    /// again. Lookups that fail or time out only drop their own bucket.
    #[instrument(skip_all)]
    pub async fn ensure_populated(&mut self, client: &dyn S3Client) -> Result<(), S3Error> {
        if self.populated {
            return Ok(());
        }

        let buckets = client.list_buckets().await?;
        debug!(count = buckets.len(), "Listed S3 buckets");

        let policy = &self.policy;
        let lookups = buckets
            .iter()
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| resolve_bucket_region(client, bucket, policy));
        let resolved = join_all(lookups).await;

        let mut by_region: HashMap<String, Vec<String>> = HashMap::new();
        for (bucket, region) in resolved.into_iter().flatten() {
            by_region.entry(region).or_default().push(bucket);
        }
        for names in by_region.values_mut() {
            names.sort();
        }

        info!(
            buckets = buckets.len(),
            regions = by_region.len(),
            "Cached S3 buckets by region"
        );
        self.buckets_by_region = by_region;
        self.populated = true;
        Ok(())
    }

    /// Cached buckets in `region`, sorted; empty when none are known
    pub fn buckets_for(&self, region: &str) -> &[String] {
        self.buckets_by_region
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Populate if needed and describe what the bucket prompt should offer.
    ///
    /// Listing failures are not raised: they become an `Unavailable` choice
    /// carrying the error text, so the user can still navigate back.
    pub async fn choices_for(&mut self, region: &str, client: &dyn S3Client) -> BucketChoices {
        let failure = match self.ensure_populated(client).await {
            Ok(()) => None,
            Err(err) => {
                warn!(region, %err, "Failed to list S3 buckets");
                Some(err)
            }
        };

        let buckets = self.buckets_for(region);
        if !buckets.is_empty() {
            return BucketChoices::Available(buckets.to_vec());
        }

        match failure {
            Some(err) => BucketChoices::Unavailable {
                message: format!("There was a problem accessing S3 in region {region}"),
                detail: Some(err.to_string()),
            },
            None => BucketChoices::Unavailable {
                message: format!("You do not have access to any S3 buckets in {region}"),
                detail: None,
            },
        }
    }
}

/// Resolve one bucket's region, or `None` if the lookup gave up
async fn resolve_bucket_region(
    client: &dyn S3Client,
    bucket: &str,
    policy: &BucketLookupPolicy,
) -> Option<(String, String)> {
    let lookup = || async move { client.get_bucket_location(bucket).await };
    let retried = lookup
        .retry(policy.backoff())
        .when(S3Error::is_transient)
        .notify(|err: &S3Error, dur: Duration| {
            warn!(bucket, "Retrying bucket location lookup after {:?}: {}", dur, err);
        });

    match tokio::time::timeout(policy.timeout, retried).await {
        Ok(Ok(location)) => Some((bucket.to_string(), normalize_location(location.as_deref()))),
        Ok(Err(err)) => {
            warn!(bucket, %err, "Skipping bucket whose region could not be resolved");
            None
        }
        Err(_) => {
            warn!(bucket, timeout = ?policy.timeout, "Timed out resolving bucket region");
            None
        }
    }
}
