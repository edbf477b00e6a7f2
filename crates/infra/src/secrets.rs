//! Secrets read from the process environment.

use async_trait::async_trait;

use adpipe_pipeline::{SecretError, SecretStore};

/// Resolves a secret named `n` from the variable `{prefix}n`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn variable_for(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        let var = self.variable_for(name);
        match std::env::var(&var) {
            Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(name.to_string())),
            Err(e) => Err(SecretError::Backend(format!("{var}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_variable_is_not_found() {
        let store = EnvSecretStore::with_prefix("ADPIPE_TEST_SECRET_THAT_IS_NEVER_SET_");
        assert_eq!(store.variable_for("x"), "ADPIPE_TEST_SECRET_THAT_IS_NEVER_SET_x");
        assert_eq!(
            store.fetch_secret("x").await.unwrap_err(),
            SecretError::NotFound("x".into())
        );
    }

    #[tokio::test]
    async fn reads_present_variable() {
        // PATH is set in every test environment.
        let value = EnvSecretStore::new().fetch_secret("PATH").await.unwrap();
        assert!(!value.is_empty());
    }
}
