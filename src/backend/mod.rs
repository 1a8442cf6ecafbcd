//! The outbound seam towards the search cluster.
//!
//! [`SearchBackend`] covers exactly the calls the logger performs. The OpenSearch client in
//! [`crate::opensearch`] talks to a real cluster, [`memory::InMemoryBackend`] keeps everything in
//! process for tests and local development.

use crate::opensearch::template::IndexTemplate;
use async_trait::async_trait;
use serde_json::Value;

pub mod memory;

/// Template management and document indexing against a search cluster.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Determines whether an index template with the given name is installed.
    async fn template_exists(&self, name: &str) -> anyhow::Result<bool>;

    /// Removes the index template with the given name.
    async fn delete_template(&self, name: &str) -> anyhow::Result<()>;

    /// Installs (or replaces) the given index template.
    async fn put_template(&self, template: &IndexTemplate) -> anyhow::Result<()>;

    /// Stores a single document in the given index.
    async fn index_document(&self, index: &str, document: &Value) -> anyhow::Result<()>;
}
