//! Reference data loading (JSON documents kept in storage buckets).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Location of a reference document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceObject {
    pub bucket: String,
    pub object: String,
}

impl ReferenceObject {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

/// Loads a JSON document by bucket and object name.
///
/// Implementations log failures and return `None`; callers treat missing and
/// unreadable data alike.
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    async fn load(&self, bucket: &str, object: &str) -> Option<Value>;
}

#[async_trait]
impl<S> ReferenceDataSource for Arc<S>
where
    S: ReferenceDataSource + ?Sized,
{
    async fn load(&self, bucket: &str, object: &str) -> Option<Value> {
        (**self).load(bucket, object).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceData {
    objects: HashMap<(String, String), Value>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: impl Into<String>, object: impl Into<String>, data: Value) -> Self {
        self.objects.insert((bucket.into(), object.into()), data);
        self
    }
}

#[async_trait]
impl ReferenceDataSource for InMemoryReferenceData {
    async fn load(&self, bucket: &str, object: &str) -> Option<Value> {
        let found = self.objects.get(&(bucket.to_string(), object.to_string())).cloned();
        if found.is_none() {
            tracing::error!(bucket, object, "failed to load reference data");
        }
        found
    }
}
