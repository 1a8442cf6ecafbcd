//! OpenSearch/Elasticsearch client for template management and document indexing.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `OPENSEARCH_URL` | OpenSearch cluster URL |
//! | `OPENSEARCH_USER` | Username for basic auth (optional) |
//! | `OPENSEARCH_PASS` | Password for basic auth (optional) |

use crate::backend::SearchBackend;
use crate::logger::options::Credentials;
use crate::opensearch::template::IndexTemplate;
use anyhow::{Context, bail};
use async_trait::async_trait;
use opensearch::http::response::Response;
use opensearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use opensearch::indices::{
    IndicesDeleteTemplateParts, IndicesExistsTemplateParts, IndicesPutTemplateParts,
};
use opensearch::{IndexParts, OpenSearch};
use serde_json::Value;

pub mod template;

const HTTP_NOT_FOUND: u16 = 404;

/// OpenSearch client wrapper.
pub struct OpenSearchClient {
    /// The underlying OpenSearch client.
    pub client: OpenSearch,
}

impl OpenSearchClient {
    /// Creates a client for a single cluster node.
    pub fn new(url: &str, credentials: Option<&Credentials>) -> anyhow::Result<Self> {
        let conn_pool = SingleNodeConnectionPool::new(
            url.parse()
                .with_context(|| format!("Invalid OpenSearch URL: {}", url))?,
        );

        let mut builder = TransportBuilder::new(conn_pool);

        if let Some(credentials) = credentials {
            builder = builder.auth(opensearch::auth::Credentials::Basic(
                credentials.user.clone(),
                credentials.pass.clone(),
            ));
        }

        let transport = builder
            .build()
            .context("Failed to set up the OpenSearch transport")?;
        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

async fn expect_success(response: Response, action: &str) -> anyhow::Result<()> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    bail!("Failed to {}: {} {}", action, status, body)
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    async fn template_exists(&self, name: &str) -> anyhow::Result<bool> {
        let response = self
            .client
            .indices()
            .exists_template(IndicesExistsTemplateParts::Name(&[name]))
            .send()
            .await
            .with_context(|| format!("Failed to check whether template {} exists", name))?;

        let status = response.status_code();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == HTTP_NOT_FOUND {
            Ok(false)
        } else {
            bail!(
                "Failed to check whether template {} exists: {}",
                name,
                status
            )
        }
    }

    #[tracing::instrument(level = "debug", skip(self), err(Display))]
    async fn delete_template(&self, name: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .indices()
            .delete_template(IndicesDeleteTemplateParts::Name(name))
            .send()
            .await
            .with_context(|| format!("Failed to delete template {}", name))?;

        expect_success(response, &format!("delete template {}", name)).await
    }

    #[tracing::instrument(level = "debug", skip(self, template), fields(template = %template.name), err(Display))]
    async fn put_template(&self, template: &IndexTemplate) -> anyhow::Result<()> {
        let response = self
            .client
            .indices()
            .put_template(IndicesPutTemplateParts::Name(&template.name))
            .body(template)
            .send()
            .await
            .with_context(|| format!("Failed to put template {}", template.name))?;

        expect_success(response, &format!("put template {}", template.name)).await
    }

    #[tracing::instrument(level = "debug", skip(self, document), err(Display))]
    async fn index_document(&self, index: &str, document: &Value) -> anyhow::Result<()> {
        let response = self
            .client
            .index(IndexParts::Index(index))
            .body(document)
            .send()
            .await
            .with_context(|| format!("Failed to index document into {}", index))?;

        expect_success(response, &format!("index document into {}", index)).await
    }
}
