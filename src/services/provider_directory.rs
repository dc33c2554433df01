//! Provider directory boundary. The booking core only reads provider profiles.

use crate::models::{BlackoutWindow, ProviderProfile};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Provider directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    /// Every provider registered for the service, available or not
    async fn providers_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<ProviderProfile>, DirectoryError>;

    async fn blackout_windows(&self, provider_id: &str)
        -> Result<Vec<BlackoutWindow>, DirectoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProviderDirectory {
    providers: DashMap<String, ProviderProfile>,
}

impl InMemoryProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(providers: impl IntoIterator<Item = ProviderProfile>) -> Self {
        let directory = Self::new();
        for provider in providers {
            directory.upsert(provider);
        }
        directory
    }

    pub fn upsert(&self, provider: ProviderProfile) {
        self.providers.insert(provider.id.clone(), provider);
    }

    pub fn set_available(&self, provider_id: &str, available: bool) {
        if let Some(mut provider) = self.providers.get_mut(provider_id) {
            provider.available = available;
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ProviderDirectory for InMemoryProviderDirectory {
    async fn providers_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<ProviderProfile>, DirectoryError> {
        Ok(self
            .providers
            .iter()
            .filter(|entry| entry.value().serves(service_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn blackout_windows(
        &self,
        provider_id: &str,
    ) -> Result<Vec<BlackoutWindow>, DirectoryError> {
        Ok(self
            .providers
            .get(provider_id)
            .map(|p| p.blackout_windows.clone())
            .unwrap_or_default())
    }
}
