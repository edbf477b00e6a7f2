//! Reference data over plain HTTP from a storage bucket.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use adpipe_pipeline::ReferenceDataSource;

pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Loads `{endpoint}/{bucket}/{object}` as JSON.
#[derive(Debug, Clone)]
pub struct BucketReferenceLoader {
    http: reqwest::Client,
    endpoint: String,
}

impl BucketReferenceLoader {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_endpoint(DEFAULT_STORAGE_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn object_url(&self, bucket: &str, object: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, object)
    }
}

#[async_trait]
impl ReferenceDataSource for BucketReferenceLoader {
    async fn load(&self, bucket: &str, object: &str) -> Option<Value> {
        let url = self.object_url(bucket, object);
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(bucket, object, error = %e, "failed to load data from bucket");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            error!(bucket, object, status = response.status().as_u16(), "failed to load data from bucket");
            return None;
        }

        match response.json::<Value>().await {
            Ok(v) => Some(v),
            Err(e) => {
                error!(bucket, object, error = %e, "bucket object is not valid JSON");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_urls() {
        let loader = BucketReferenceLoader::with_endpoint("http://localhost:1/").unwrap();
        assert_eq!(loader.object_url("b", "dir/x.json"), "http://localhost:1/b/dir/x.json");

        let default = BucketReferenceLoader::new().unwrap();
        assert_eq!(default.object_url("b", "x.json"), "https://storage.googleapis.com/b/x.json");
    }
}
