//! Region check between the data bucket and the active session.

use async_trait::async_trait;
use tracing::debug;

use crate::detection::rekognition::sdk_error;
use crate::error::{Error, Result};

/// Finds the region a bucket lives in.
#[async_trait]
pub trait BucketLocator: Send + Sync {
    async fn bucket_region(&self, bucket: &str) -> Result<String>;
}

pub struct S3BucketLocator {
    client: aws_sdk_s3::Client,
}

impl S3BucketLocator {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl BucketLocator for S3BucketLocator {
    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let out = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketLocation", e))?;
        let constraint = out.location_constraint().map(|c| c.as_str().to_string());
        debug!("Bucket {} location constraint: {:?}", bucket, constraint);
        Ok(region_from_location_constraint(constraint.as_deref()))
    }
}

/// An empty constraint means us-east-1; the legacy `EU` value means eu-west-1.
pub fn region_from_location_constraint(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => "us-east-1".to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

pub fn check_region(bucket: &str, bucket_region: &str, session_region: &str) -> Result<()> {
    if bucket_region == session_region {
        Ok(())
    } else {
        Err(Error::RegionMismatch {
            bucket: bucket.to_string(),
            bucket_region: bucket_region.to_string(),
            session_region: session_region.to_string(),
        })
    }
}

/// Looks up the bucket region and compares it with `session_region`.
pub async fn ensure_same_region(
    locator: &dyn BucketLocator,
    bucket: &str,
    session_region: &str,
) -> Result<()> {
    let bucket_region = locator.bucket_region(bucket).await?;
    check_region(bucket, &bucket_region, session_region)
}
