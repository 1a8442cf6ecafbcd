//! Configuration surface of the request logger.
//!
//! [`LoggerOptions::default`] carries the defaults; the `with_*` builder methods override single
//! values. The index template is merged one level deep via [`TemplateOverrides`], so a caller
//! only has to name the template keys it wants to change.

use crate::logger::error::LoggerError;
use crate::logger::record::LogRecord;
use crate::opensearch::template::FieldMapping;
use crate::{APP_NAME, APP_VERSION};
use anyhow::bail;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, LazyLock};

const ENV_OPENSEARCH_URL: &str = "OPENSEARCH_URL";
const ENV_OPENSEARCH_USER: &str = "OPENSEARCH_USER";
const ENV_OPENSEARCH_PASS: &str = "OPENSEARCH_PASS";

pub const DEFAULT_NODE: &str = "http://localhost:9200";
pub const DEFAULT_TEMPLATE_NAME: &str = "rs-es-logger";
pub const DEFAULT_INDEX_TIME_FORMAT: &str = "%Y-%m-%d";

/// Template and index names must be lowercase and must not contain the characters
/// OpenSearch reserves (`\ / * ? " < > | , #`, space) or start with `-`, `_` or `+`.
static VALID_TEMPLATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^-_+A-Z\\/*?"<>|, #][^A-Z\\/*?"<>|, #]*$"#).unwrap());

/// Rewrites a single body or query value: `(field_name, value) -> replacement`.
pub type TransformHook = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Computes a custom field: `(field_name, record) -> value`.
pub type CustomDataHook = Arc<dyn Fn(&str, &LogRecord) -> Value + Send + Sync>;

/// Invoked once template provisioning has finished (successfully or not).
pub type ReadyHook = Arc<dyn Fn() + Send + Sync>;

/// Receives provisioning and write errors.
pub type ErrorHook = Arc<dyn Fn(&LoggerError) + Send + Sync>;

/// Basic auth credentials for the cluster.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"********")
            .finish()
    }
}

/// The index template the logger provisions and writes into.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateOptions {
    /// Template name, also the prefix of every index name.
    pub name: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// Custom fields. Each key becomes a document field populated by the custom data hook.
    pub properties: BTreeMap<String, FieldMapping>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            number_of_shards: 1,
            number_of_replicas: 0,
            properties: BTreeMap::new(),
        }
    }
}

/// A partial [`TemplateOptions`]: only the keys which are set replace the defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplateOverrides {
    pub name: Option<String>,
    pub number_of_shards: Option<u32>,
    pub number_of_replicas: Option<u32>,
    pub properties: Option<BTreeMap<String, FieldMapping>>,
}

impl TemplateOverrides {
    /// Overrides only the template name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Declares the custom fields of the template.
    pub fn with_properties<I, K>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldMapping)>,
        K: Into<String>,
    {
        self.properties = Some(
            properties
                .into_iter()
                .map(|(key, mapping)| (key.into(), mapping))
                .collect(),
        );
        self
    }
}

impl TemplateOptions {
    /// Applies the given overrides on top of these options.
    pub fn merge(self, overrides: TemplateOverrides) -> Self {
        Self {
            name: overrides.name.unwrap_or(self.name),
            number_of_shards: overrides.number_of_shards.unwrap_or(self.number_of_shards),
            number_of_replicas: overrides
                .number_of_replicas
                .unwrap_or(self.number_of_replicas),
            properties: overrides.properties.unwrap_or(self.properties),
        }
    }
}

/// Everything the request logger can be configured with.
///
/// Hooks are optional: without `transform_body` / `transform_query` values are stored as
/// received, without `get_custom_data` all custom fields are `null`.
#[derive(Clone)]
pub struct LoggerOptions {
    /// URL of the cluster node.
    pub node: String,
    pub credentials: Option<Credentials>,
    pub template: TemplateOptions,
    /// `chrono` strftime pattern for the date suffix of index names.
    pub index_time_format: String,
    pub app_name: String,
    pub version: String,
    /// Deletes and re-installs an existing template on startup.
    pub clear_template: bool,
    pub get_custom_data: Option<CustomDataHook>,
    pub transform_body: Option<TransformHook>,
    pub transform_query: Option<TransformHook>,
    pub on_ready: Option<ReadyHook>,
    pub on_error: Option<ErrorHook>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            node: DEFAULT_NODE.to_string(),
            credentials: None,
            template: TemplateOptions::default(),
            index_time_format: DEFAULT_INDEX_TIME_FORMAT.to_string(),
            app_name: APP_NAME.clone(),
            version: APP_VERSION.clone(),
            clear_template: false,
            get_custom_data: None,
            transform_body: None,
            transform_query: None,
            on_ready: None,
            on_error: None,
        }
    }
}

impl Debug for LoggerOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("node", &self.node)
            .field("credentials", &self.credentials)
            .field("template", &self.template)
            .field("index_time_format", &self.index_time_format)
            .field("app_name", &self.app_name)
            .field("version", &self.version)
            .field("clear_template", &self.clear_template)
            .field("get_custom_data", &self.get_custom_data.is_some())
            .field("transform_body", &self.transform_body.is_some())
            .field("transform_query", &self.transform_query.is_some())
            .field("on_ready", &self.on_ready.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl LoggerOptions {
    /// Reads the cluster connection from `OPENSEARCH_URL`, `OPENSEARCH_USER` and
    /// `OPENSEARCH_PASS`. Everything else keeps its default.
    pub fn from_env() -> Self {
        let node = env::var(ENV_OPENSEARCH_URL).unwrap_or(DEFAULT_NODE.to_string());
        let user = env::var(ENV_OPENSEARCH_USER).unwrap_or_default();
        let pass = env::var(ENV_OPENSEARCH_PASS).unwrap_or_default();

        let options = Self::default().with_node(node);
        if user.is_empty() {
            options
        } else {
            options.with_credentials(user, pass)
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            user: user.into(),
            pass: pass.into(),
        });
        self
    }

    /// Merges the given overrides into the template options.
    pub fn with_template(mut self, overrides: TemplateOverrides) -> Self {
        self.template = self.template.merge(overrides);
        self
    }

    pub fn with_index_time_format(mut self, format: impl Into<String>) -> Self {
        self.index_time_format = format.into();
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_clear_template(mut self, clear_template: bool) -> Self {
        self.clear_template = clear_template;
        self
    }

    pub fn with_custom_data<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &LogRecord) -> Value + Send + Sync + 'static,
    {
        self.get_custom_data = Some(Arc::new(hook));
        self
    }

    pub fn with_transform_body<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        self.transform_body = Some(Arc::new(hook));
        self
    }

    pub fn with_transform_query<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        self.transform_query = Some(Arc::new(hook));
        self
    }

    pub fn with_on_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(hook));
        self
    }

    pub fn with_on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&LoggerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Rejects settings which would only fail later, on every single write.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !VALID_TEMPLATE_NAME.is_match(&self.template.name) {
            bail!("Invalid template name: '{}'", self.template.name);
        }

        if self.index_time_format.is_empty() {
            bail!("The index time format must not be empty");
        }
        let items: Vec<Item<'_>> = StrftimeItems::new(&self.index_time_format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            bail!("Invalid index time format: '{}'", self.index_time_format);
        }
        // A pattern made up of literals only would route every document into one index.
        if !items
            .iter()
            .any(|item| matches!(item, Item::Numeric(..) | Item::Fixed(_)))
        {
            bail!(
                "The index time format '{}' contains no date specifier (e.g. '%Y-%m-%d')",
                self.index_time_format
            );
        }

        if self.node.trim().is_empty() {
            bail!("No cluster node configured");
        }

        if self.template.properties.keys().any(|key| key.is_empty()) {
            bail!("Empty custom field name in template properties");
        }

        Ok(())
    }
}
