//! Template registration for validated generations.
//!
//! Once a pipeline run produces a usable file set, it is registered as a
//! template so later requests can reference it by id. The [`TemplateStore`]
//! trait keeps the orchestrator independent of where that registry lives;
//! [`LocalTemplateStore`] is the in-process implementation backing the CLI.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TemplateError;

/// A registered generation template and its server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Unique identifier of the template.
    pub template_id: String,
    /// Identifier of the server instance created from the template.
    pub server_id: String,
    /// Human-readable template name.
    pub name: String,
    /// Short description of what the generated server does.
    pub description: String,
    /// Identifier of the requesting user, when known.
    pub owner_id: Option<String>,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

/// Registry that mints identities for validated generations.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Registers a template, minting its template and server ids.
    async fn create(
        &self,
        name: &str,
        description: &str,
        owner_id: Option<&str>,
    ) -> Result<TemplateRecord, TemplateError>;
}

/// In-memory template registry.
#[derive(Clone, Default)]
pub struct LocalTemplateStore {
    records: Arc<Mutex<HashMap<String, TemplateRecord>>>,
}

impl LocalTemplateStore {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a registered template by id.
    pub fn get(&self, template_id: &str) -> Option<TemplateRecord> {
        self.records().get(template_id).cloned()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, TemplateRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl TemplateStore for LocalTemplateStore {
    async fn create(
        &self,
        name: &str,
        description: &str,
        owner_id: Option<&str>,
    ) -> Result<TemplateRecord, TemplateError> {
        if name.trim().is_empty() {
            return Err(TemplateError::EmptyName);
        }

        let record = TemplateRecord {
            template_id: Uuid::new_v4().to_string(),
            server_id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description: description.to_string(),
            owner_id: owner_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        };

        self.records()
            .insert(record.template_id.clone(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_mints_distinct_ids() {
        let store = LocalTemplateStore::new();

        let first = store
            .create("Weather Service", "Forecast lookups", None)
            .await
            .expect("create");
        let second = store
            .create("Weather Service", "Forecast lookups", None)
            .await
            .expect("create");

        assert_ne!(first.template_id, second.template_id);
        assert_ne!(first.server_id, second.server_id);
        assert_ne!(first.template_id, first.server_id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let store = LocalTemplateStore::new();
        let result = store.create("   ", "whatever", None).await;
        assert!(matches!(result, Err(TemplateError::EmptyName)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_record_retrievable_by_id() {
        let store = LocalTemplateStore::new();
        let record = store
            .create("GitHub Tools", "Issue and PR helpers", Some("user-1"))
            .await
            .expect("create");

        let found = store.get(&record.template_id).expect("lookup");
        assert_eq!(found.name, "GitHub Tools");
        assert_eq!(found.owner_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_name_trimmed_on_registration() {
        let store = LocalTemplateStore::new();
        let record = store
            .create("  Spaced Out  ", "desc", None)
            .await
            .expect("create");
        assert_eq!(record.name, "Spaced Out");
    }
}
