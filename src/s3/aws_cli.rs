//! S3 lookups through the AWS CLI (`aws s3api`).
//!
//! Credentials, profiles and endpoints are whatever the `aws` binary
//! resolves on its own, so no SDK or credential handling lives here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{S3Client, S3Error};

/// `aws s3api list-buckets` output
#[derive(Debug, Deserialize)]
struct ListBucketsOutput {
    #[serde(rename = "Buckets", default)]
    buckets: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    #[serde(rename = "Name", default)]
    name: String,
}

/// `aws s3api get-bucket-location` output
#[derive(Debug, Deserialize)]
struct BucketLocationOutput {
    #[serde(rename = "LocationConstraint", default)]
    location_constraint: Option<String>,
}

/// S3 client backed by the `aws` executable
#[derive(Debug, Clone)]
pub struct AwsCliS3Client {
    aws_path: PathBuf,
    region: Option<String>,
}

impl AwsCliS3Client {
    pub fn new(aws_path: PathBuf) -> Self {
        Self {
            aws_path,
            region: None,
        }
    }

    /// Use `explicit` if given, otherwise find `aws` on `PATH`
    pub fn locate(explicit: Option<&str>) -> Result<Self> {
        let path = match explicit {
            Some(path) => PathBuf::from(path),
            None => which::which("aws").context("AWS CLI not found in PATH")?,
        };
        Ok(Self::new(path))
    }

    /// Region used to sign the requests (listing is account-wide either way)
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    async fn run_aws(&self, args: &[&str]) -> Result<String, S3Error> {
        debug!(?args, aws = %self.aws_path.display(), "Running aws command");

        let mut cmd = Command::new(&self.aws_path);
        cmd.arg("s3api")
            .args(args)
            .args(["--output", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a lookup abandoned by its timeout must not keep running
            .kill_on_drop(true);
        if let Some(region) = &self.region {
            cmd.args(["--region", region]);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| S3Error::CommandFailed(format!("failed to execute aws: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Map `aws` stderr to an [`S3Error`]
fn classify_failure(stderr: &str) -> S3Error {
    let lowered = stderr.to_lowercase();

    if lowered.contains("accessdenied")
        || lowered.contains("access denied")
        || lowered.contains("invalidaccesskeyid")
        || lowered.contains("expiredtoken")
        || lowered.contains("unable to locate credentials")
    {
        return S3Error::AccessDenied(stderr.to_string());
    }

    if lowered.contains("nosuchbucket") {
        return S3Error::NoSuchBucket(stderr.to_string());
    }

    if lowered.contains("timed out")
        || lowered.contains("timeout")
        || lowered.contains("could not connect")
        || lowered.contains("connection")
        || lowered.contains("throttl")
        || lowered.contains("slowdown")
    {
        return S3Error::Unavailable(stderr.to_string());
    }

    S3Error::CommandFailed(stderr.to_string())
}

fn parse_bucket_names(json: &str) -> Result<Vec<String>, S3Error> {
    let output: ListBucketsOutput =
        serde_json::from_str(json).map_err(|e| S3Error::Parse(e.to_string()))?;
    Ok(output
        .buckets
        .into_iter()
        .map(|b| b.name)
        .filter(|name| !name.is_empty())
        .collect())
}

fn parse_location_constraint(json: &str) -> Result<Option<String>, S3Error> {
    let output: BucketLocationOutput =
        serde_json::from_str(json).map_err(|e| S3Error::Parse(e.to_string()))?;
    Ok(output.location_constraint)
}

#[async_trait]
impl S3Client for AwsCliS3Client {
    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<String>, S3Error> {
        let output = self.run_aws(&["list-buckets"]).await?;
        parse_bucket_names(&output)
    }

    #[instrument(skip(self))]
    async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>, S3Error> {
        let output = self
            .run_aws(&["get-bucket-location", "--bucket", bucket])
            .await?;
        parse_location_constraint(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::{BucketLookupPolicy, RegionBucketCache};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_bucket_names() {
        let json = r#"{
            "Buckets": [
                {"Name": "my-bucket", "CreationDate": "2019-02-12T20:13:44+00:00"},
                {"Name": "other-bucket", "CreationDate": "2019-03-01T08:00:00+00:00"}
            ],
            "Owner": {"DisplayName": "me", "ID": "abc"}
        }"#;

        assert_eq!(
            parse_bucket_names(json).unwrap(),
            vec!["my-bucket".to_string(), "other-bucket".to_string()]
        );
    }

    #[test]
    fn test_parse_bucket_names_without_buckets() {
        assert!(parse_bucket_names(r#"{"Owner": {}}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_location_constraint() {
        assert_eq!(
            parse_location_constraint(r#"{"LocationConstraint": "us-west-2"}"#).unwrap(),
            Some("us-west-2".to_string())
        );
        assert_eq!(
            parse_location_constraint(r#"{"LocationConstraint": null}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert!(matches!(
            parse_location_constraint("not json"),
            Err(S3Error::Parse(_))
        ));
    }

    #[test]
    fn test_classify_access_denied() {
        let err = classify_failure(
            "An error occurred (AccessDenied) when calling the ListBuckets operation: Access Denied",
        );
        assert!(matches!(err, S3Error::AccessDenied(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_connection_errors_as_transient() {
        let err =
            classify_failure("Could not connect to the endpoint URL: \"https://s3.amazonaws.com/\"");
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_other_failures() {
        let err = classify_failure("usage: aws [options] <command> <subcommand>");
        assert!(matches!(err, S3Error::CommandFailed(_)));
    }

    /// Executable shell script standing in for `aws`
    #[cfg(unix)]
    fn fake_aws(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.path().join("aws");
        std::fs::write(&script, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_region_is_passed_to_aws() {
        let dir = TempDir::new().unwrap();
        let args_file = dir.path().join("args");
        let script = fake_aws(
            &dir,
            &format!(
                "echo \"$@\" > '{}'\necho '{{\"Buckets\": [{{\"Name\": \"my-bucket\"}}]}}'\n",
                args_file.display()
            ),
        );

        let client = AwsCliS3Client::new(script).with_region("eu-west-1");
        let buckets = client.list_buckets().await.unwrap();

        assert_eq!(buckets, vec!["my-bucket".to_string()]);
        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(args.trim(), "s3api list-buckets --output json --region eu-west-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_lookup_stops_the_aws_process() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("lookup-finished");
        let script = fake_aws(
            &dir,
            &format!(
                "case \"$2\" in\n\
                 list-buckets) echo '{{\"Buckets\": [{{\"Name\": \"slow-bucket\"}}]}}' ;;\n\
                 get-bucket-location) sleep 1; touch '{}'; echo '{{}}' ;;\n\
                 esac\n",
                marker.display()
            ),
        );
        let client = AwsCliS3Client::new(script);

        let mut cache = RegionBucketCache::new(BucketLookupPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 0,
            base_delay: Duration::from_millis(10),
        });
        cache.ensure_populated(&client).await.unwrap();

        assert!(cache.is_populated());
        assert!(cache.buckets_for("us-east-1").is_empty());

        // long enough for an orphaned lookup to have finished
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
