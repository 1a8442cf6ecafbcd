//! # Index Logger
//!
//! Persists one document per completed HTTP request into date-partitioned OpenSearch /
//! Elasticsearch indices which share a managed index template.
//!
//! The host framework hands a [`LogRecord`] to the callback returned by [`create_logger`]
//! once a response has been finalized. Everything from there on is owned by this crate:
//! shaping the document, redacting body and query fields, extracting custom fields,
//! provisioning the index template and writing into `{template}-{date}`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use index_logger::{LoggerOptions, TemplateOverrides, create_logger};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     index_logger::logging::setup_tracing()?;
//!
//!     let options = LoggerOptions::from_env()
//!         .with_template(TemplateOverrides::named("my-api"))
//!         .with_transform_body(|field, value| match field {
//!             "password" => json!("********"),
//!             _ => value,
//!         });
//!     let log = create_logger(options)?;
//!
//!     // Invoke `log(record)` for every completed request...
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`logger`] - Template provisioning and the per-request document pipeline
//! - [`opensearch`] - OpenSearch client and the index template builder
//! - [`backend`] - The search backend seam (plus an in-memory implementation)
//! - [`web`] - Warp integration
//! - [`logging`] - Tracing setup
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_NAME` | Application name stored in each document | `RS App` |
//! | `APP_VERSION` | Version string stored in each document | `DEVELOPMENT-SNAPSHOT-VERSION` |
//! | `OPENSEARCH_URL` | Cluster URL used by [`LoggerOptions::from_env`] | `http://localhost:9200` |
//! | `OPENSEARCH_USER` | Username for basic auth | (empty) |
//! | `OPENSEARCH_PASS` | Password for basic auth | (empty) |
//! | `RUST_LOG` | Console log filter | `info` |
//! | `LOG_FORMAT` | `json` switches the console output to JSON lines | (plain) |

use std::env;
use std::sync::LazyLock;

/// The search backend abstraction and its in-memory implementation.
pub mod backend;

/// Tracing setup.
pub mod logging;

/// Template provisioning and the document pipeline.
pub mod logger;

/// OpenSearch client and index template builder.
pub mod opensearch;

/// Integration with the host web framework.
pub mod web;

pub use crate::backend::SearchBackend;
pub use crate::logger::error::LoggerError;
pub use crate::logger::options::{Credentials, LoggerOptions, TemplateOptions, TemplateOverrides};
pub use crate::logger::record::{
    ErrorDescriptor, LogDocument, LogRecord, LoggedError, ResponseEnvelope,
};
pub use crate::logger::{LogHandler, RequestLogger, create_logger, create_logger_with_backend};
pub use crate::opensearch::template::{FieldMapping, IndexTemplate, build_template};

/// Application name from the `APP_NAME` environment variable.
///
/// Used as the default for [`LoggerOptions::app_name`]. Defaults to `"RS App"`.
pub static APP_NAME: LazyLock<String> =
    LazyLock::new(|| env::var("APP_NAME").unwrap_or("RS App".to_string()));

/// Application version from the `APP_VERSION` environment variable.
///
/// Typically set during CI/CD builds and used as the default for
/// [`LoggerOptions::version`]. Defaults to `"DEVELOPMENT-SNAPSHOT-VERSION"`.
pub static APP_VERSION: LazyLock<String> =
    LazyLock::new(|| env::var("APP_VERSION").unwrap_or("DEVELOPMENT-SNAPSHOT-VERSION".to_string()));
