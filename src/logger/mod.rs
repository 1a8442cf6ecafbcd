//! The request logger: template provisioning plus the per-request document pipeline.
//!
//! [`create_logger`] validates the options, launches [`RequestLogger::init`] as a detached task
//! and hands out a [`LogHandler`] which the host invokes once per completed request. Neither
//! provisioning nor writing ever fails the caller: errors end up in the `on_error` hook.

use crate::backend::SearchBackend;
use crate::logger::error::LoggerError;
use crate::logger::options::{LoggerOptions, TransformHook};
use crate::logger::record::{LogDocument, LogRecord, LoggedError};
use crate::opensearch::OpenSearchClient;
use crate::opensearch::template::{IndexTemplate, build_template};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt::Write;
use std::sync::Arc;

pub mod error;
pub mod options;
pub mod record;

/// The per-request callback handed to the host framework.
pub type LogHandler = Arc<dyn Fn(LogRecord) -> BoxFuture<'static, ()> + Send + Sync>;

/// What provisioning did to the index template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionOutcome {
    /// The template already existed and was kept.
    Kept,
    /// The template did not exist and has been installed.
    Created,
    /// The template existed and has been deleted and re-installed.
    Recreated,
}

/// Creates a logger which writes into the cluster configured in `options`.
///
/// Must be called from within a tokio runtime, as template provisioning is spawned onto it.
pub fn create_logger(options: LoggerOptions) -> anyhow::Result<LogHandler> {
    let backend = OpenSearchClient::new(&options.node, options.credentials.as_ref())?;
    create_logger_with_backend(options, Arc::new(backend))
}

/// Creates a logger on top of the given backend.
///
/// Provisioning runs in the background; the returned handler may be invoked right away.
pub fn create_logger_with_backend(
    options: LoggerOptions,
    backend: Arc<dyn SearchBackend>,
) -> anyhow::Result<LogHandler> {
    let runtime = tokio::runtime::Handle::try_current()
        .context("The request logger has to be created within a tokio runtime")?;

    let logger = Arc::new(RequestLogger::new(options, backend)?);
    runtime.spawn({
        let logger = logger.clone();
        async move { logger.init().await }
    });

    Ok(logger.handler())
}

/// Provisions the index template and turns log records into indexed documents.
pub struct RequestLogger {
    options: Arc<LoggerOptions>,
    backend: Arc<dyn SearchBackend>,
}

impl RequestLogger {
    /// Creates a logger for the given options, which are validated first.
    pub fn new(options: LoggerOptions, backend: Arc<dyn SearchBackend>) -> anyhow::Result<Self> {
        options.validate()?;

        Ok(Self {
            options: Arc::new(options),
            backend,
        })
    }

    pub fn options(&self) -> &LoggerOptions {
        &self.options
    }

    /// Returns a callback which logs each given record.
    pub fn handler(self: &Arc<Self>) -> LogHandler {
        let logger = self.clone();
        Arc::new(move |record: LogRecord| {
            let logger = logger.clone();
            async move { logger.log(record).await }.boxed()
        })
    }

    /// Builds the template described by the options.
    pub fn template(&self) -> IndexTemplate {
        let template = &self.options.template;
        build_template(
            &template.name,
            template.number_of_shards,
            template.number_of_replicas,
            &template.properties,
        )
    }

    /// Makes sure the index template is installed and signals readiness.
    ///
    /// `on_ready` fires exactly once, also if provisioning failed. Failures are only reported
    /// via `on_error`.
    #[tracing::instrument(skip(self), fields(template = %self.options.template.name))]
    pub async fn init(&self) {
        match self.provision_template().await {
            Ok(outcome) => {
                tracing::info!(?outcome, "Index template provisioned");
            }
            Err(cause) => self.report(LoggerError::Provisioning {
                template: self.options.template.name.clone(),
                cause,
            }),
        }

        if let Some(on_ready) = &self.options.on_ready {
            on_ready();
        }
    }

    async fn provision_template(&self) -> anyhow::Result<ProvisionOutcome> {
        let name = &self.options.template.name;
        let exists = self.backend.template_exists(name).await?;

        if exists && !self.options.clear_template {
            return Ok(ProvisionOutcome::Kept);
        }

        if exists {
            tracing::debug!("Clearing existing index template {}", name);
            self.backend.delete_template(name).await?;
        }
        self.backend.put_template(&self.template()).await?;

        Ok(if exists {
            ProvisionOutcome::Recreated
        } else {
            ProvisionOutcome::Created
        })
    }

    /// Logs the given record with the current time.
    pub async fn log(&self, record: LogRecord) {
        self.log_at(record, Utc::now()).await;
    }

    /// Logs the given record as if it completed at `timestamp`.
    ///
    /// The timestamp determines both `@timestamp` and the index the document is written into.
    #[tracing::instrument(level = "debug", skip_all, fields(method = %record.method, path = %record.path))]
    pub async fn log_at(&self, record: LogRecord, timestamp: DateTime<Utc>) {
        let index = match self.index_name(timestamp) {
            Ok(index) => index,
            Err(cause) => {
                self.report(LoggerError::Write {
                    index: format!("{}-*", self.options.template.name),
                    cause,
                });
                return;
            }
        };
        let document = self.build_document(&record, timestamp);

        let result = match document.to_value() {
            Ok(json) => self.backend.index_document(&index, &json).await,
            Err(err) => Err(err),
        };

        if let Err(cause) = result {
            self.report(LoggerError::Write { index, cause });
        }
    }

    /// The index a document logged at `timestamp` is written into.
    pub fn index_name(&self, timestamp: DateTime<Utc>) -> anyhow::Result<String> {
        let mut index = format!("{}-", self.options.template.name);
        write!(index, "{}", timestamp.format(&self.options.index_time_format)).with_context(|| {
            format!(
                "Cannot format index date using '{}'",
                self.options.index_time_format
            )
        })?;

        Ok(index)
    }

    /// Shapes the document persisted for the given record.
    pub fn build_document(&self, record: &LogRecord, timestamp: DateTime<Utc>) -> LogDocument {
        let method = record.method.to_uppercase();

        LogDocument {
            timestamp,
            app_name: self.options.app_name.clone(),
            body: transform_fields(&record.body, self.options.transform_body.as_ref()),
            error: record.response.error.as_ref().map(LoggedError::from),
            headers: record.headers.clone(),
            route: format!("{} {}", method, record.spec),
            method,
            params: record.params.clone(),
            path: record.path.clone(),
            query: transform_fields(&record.query, self.options.transform_query.as_ref()),
            spec: record.spec.clone(),
            status_code: record.status_code,
            took: record.took,
            version: self.options.version.clone(),
            custom: self.custom_data(record),
        }
    }

    fn custom_data(&self, record: &LogRecord) -> Map<String, Value> {
        self.options
            .template
            .properties
            .keys()
            .map(|field| {
                let value = match &self.options.get_custom_data {
                    Some(get_custom_data) => get_custom_data(field.as_str(), record),
                    None => Value::Null,
                };
                (field.clone(), value)
            })
            .collect()
    }

    fn report(&self, error: LoggerError) {
        match &self.options.on_error {
            Some(on_error) => {
                tracing::debug!(cause = ?error.cause(), "{}", error);
                on_error(&error);
            }
            None => tracing::warn!(cause = ?error.cause(), "{}", error),
        }
    }
}

fn transform_fields(fields: &Map<String, Value>, hook: Option<&TransformHook>) -> Map<String, Value> {
    match hook {
        Some(transform) => fields
            .iter()
            .map(|(key, value)| (key.clone(), transform(key.as_str(), value.clone())))
            .collect(),
        None => fields.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{BackendCall, InMemoryBackend};
    use crate::logger::options::TemplateOverrides;
    use crate::logger::record::{ErrorDescriptor, ResponseEnvelope};
    use crate::opensearch::template::FieldMapping;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TEMPLATE_NAME: &str = "dev_rs-logger";
    const APP_NAME: &str = "RS Logger Test App";

    const FIXED_FIELDS: [&str; 14] = [
        "@timestamp",
        "appName",
        "body",
        "error",
        "headers",
        "method",
        "params",
        "path",
        "query",
        "route",
        "spec",
        "statusCode",
        "took",
        "version",
    ];

    fn options() -> LoggerOptions {
        LoggerOptions::default()
            .with_app_name(APP_NAME)
            .with_version("1.2.3")
            .with_template(
                TemplateOverrides::named(TEMPLATE_NAME)
                    .with_properties([("userId", FieldMapping::Integer)]),
            )
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn test_record() -> LogRecord {
        LogRecord {
            status_code: 200,
            method: "GET".to_string(),
            path: "/test".to_string(),
            spec: "/test".to_string(),
            took: Some(12),
            response: ResponseEnvelope {
                data: Some(json!(true)),
                ..ResponseEnvelope::default()
            },
            ..LogRecord::default()
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn logger(options: LoggerOptions) -> (RequestLogger, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        (RequestLogger::new(options, backend.clone()).unwrap(), backend)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook = {
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        (count, hook)
    }

    #[tokio::test]
    async fn logs_plain_request() {
        let (logger, backend) = logger(options());

        logger
            .log_at(test_record(), at("2024-03-01T10:00:00Z"))
            .await;

        let documents = backend.documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].index, "dev_rs-logger-2024-03-01");
        assert_eq!(
            documents[0].source,
            json!({
                "@timestamp": "2024-03-01T10:00:00Z",
                "appName": APP_NAME,
                "body": {},
                "error": null,
                "headers": {},
                "method": "GET",
                "params": {},
                "path": "/test",
                "query": {},
                "route": "GET /test",
                "spec": "/test",
                "statusCode": 200,
                "took": 12,
                "version": "1.2.3",
                "userId": null
            })
        );
    }

    #[tokio::test]
    async fn document_contains_fixed_and_custom_fields_only() {
        let options = options().with_template(TemplateOverrides::default().with_properties([
            ("userId", FieldMapping::Integer),
            ("tenant", FieldMapping::Keyword { ignore_above: None }),
        ]));
        let (logger, backend) = logger(options);

        logger.log(test_record()).await;

        let source = object(backend.documents()[0].source.clone());
        let mut keys: Vec<_> = source.keys().cloned().collect();
        keys.sort();
        let mut expected: Vec<_> = FIXED_FIELDS
            .iter()
            .chain(["userId", "tenant"].iter())
            .map(|key| key.to_string())
            .collect();
        expected.sort();

        assert_eq!(keys, expected);
        assert_eq!(source["userId"], Value::Null);
        assert_eq!(source["tenant"], Value::Null);
    }

    #[tokio::test]
    async fn routes_by_date() {
        let (logger, backend) = logger(options());

        logger.log_at(test_record(), at("2024-03-01T23:59:59Z")).await;
        logger.log_at(test_record(), at("2024-03-02T00:00:00Z")).await;

        let indices: Vec<_> = backend.documents().into_iter().map(|d| d.index).collect();
        assert_eq!(
            indices,
            vec!["dev_rs-logger-2024-03-01", "dev_rs-logger-2024-03-02"]
        );
    }

    #[test]
    fn honors_custom_index_time_format() {
        let (logger, _) = logger(options().with_index_time_format("%Y.%m"));

        assert_eq!(
            logger.index_name(at("2024-03-01T10:00:00Z")).unwrap(),
            "dev_rs-logger-2024.03"
        );
    }

    #[test]
    fn refuses_options_which_cannot_partition_by_date() {
        let backend = Arc::new(InMemoryBackend::new());

        for format in ["%Q", "YYYY-MM-DD"] {
            let options = options().with_index_time_format(format);
            assert!(RequestLogger::new(options, backend.clone()).is_err());
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn reports_unformattable_index_dates() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (mut logger, backend) = logger(options().with_on_error({
            let errors = errors.clone();
            move |error: &LoggerError| errors.lock().unwrap().push(error.to_string())
        }));
        // Options are immutable once validated; swap in a broken pattern behind the check.
        let mut broken = logger.options().clone();
        broken.index_time_format = "%Q".to_string();
        logger.options = Arc::new(broken);

        logger.log(test_record()).await;

        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("dev_rs-logger-*"));
        assert!(backend.documents().is_empty());
    }

    #[test]
    fn route_uses_uppercase_method() {
        let (logger, _) = logger(options());

        for method in ["get", "Get", "GET"] {
            let record = LogRecord {
                method: method.to_string(),
                spec: "/0/user/:id".to_string(),
                ..test_record()
            };
            let document = logger.build_document(&record, Utc::now());

            assert_eq!(document.method, "GET");
            assert_eq!(document.route, "GET /0/user/:id");
        }
    }

    #[test]
    fn formats_response_errors() {
        let (logger, _) = logger(options());
        let record = LogRecord {
            status_code: 400,
            method: "POST".to_string(),
            response: ResponseEnvelope {
                error: Some(
                    ErrorDescriptor::new(
                        "ERR_MISSING_PARAMETER",
                        "Parameter 'password' is missing.",
                    )
                    .with_extra("statusCode", json!(400)),
                ),
                ..ResponseEnvelope::default()
            },
            ..test_record()
        };

        let document = logger.build_document(&record, Utc::now()).to_value().unwrap();
        assert_eq!(
            document["error"],
            json!({
                "code": "ERR_MISSING_PARAMETER",
                "message": "Parameter 'password' is missing.",
                "payload": {}
            })
        );
    }

    #[test]
    fn transforms_each_body_and_query_field_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let options = options()
            .with_transform_body({
                let seen = seen.clone();
                move |field: &str, value: Value| {
                    seen.lock().unwrap().push(format!("body.{}", field));
                    match field {
                        "password" => json!("********"),
                        _ => value,
                    }
                }
            })
            .with_transform_query({
                let seen = seen.clone();
                move |field: &str, value: Value| {
                    seen.lock().unwrap().push(format!("query.{}", field));
                    match field {
                        "transform" => json!("baf"),
                        _ => value,
                    }
                }
            });
        let (logger, _) = logger(options);
        let record = LogRecord {
            body: object(json!({"email": "test@test.com", "password": "password"})),
            query: object(json!({"test": "test", "transform": "transform"})),
            ..test_record()
        };

        let document = logger.build_document(&record, Utc::now());

        assert_eq!(
            Value::Object(document.body),
            json!({"email": "test@test.com", "password": "********"})
        );
        assert_eq!(
            Value::Object(document.query),
            json!({"test": "test", "transform": "baf"})
        );
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["body.email", "body.password", "query.test", "query.transform"]
        );
        // The record itself stays untouched.
        assert_eq!(record.body["password"], json!("password"));
    }

    #[test]
    fn extracts_custom_data_from_the_full_record() {
        let options = options().with_custom_data(|field, record| match field {
            "userId" => record
                .response
                .data
                .as_ref()
                .and_then(|data| data.get("userId"))
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        });
        let (logger, _) = logger(options);
        let record = LogRecord {
            response: ResponseEnvelope {
                data: Some(json!({"data": true, "userId": 1})),
                ..ResponseEnvelope::default()
            },
            ..test_record()
        };

        let document = logger.build_document(&record, Utc::now());
        assert_eq!(document.custom, object(json!({"userId": 1})));

        let document = logger.build_document(&test_record(), Utc::now());
        assert_eq!(document.custom, object(json!({"userId": null})));
    }

    #[tokio::test]
    async fn reports_write_failures_once() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let options = options().with_on_error({
            let errors = errors.clone();
            move |error: &LoggerError| errors.lock().unwrap().push(error.to_string())
        });
        let (logger, backend) = logger(options);
        backend.fail_writes(true);

        logger.log_at(test_record(), at("2024-03-01T10:00:00Z")).await;

        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("dev_rs-logger-2024-03-01"));
        assert!(errors[0].contains("Cluster unavailable"));
        assert!(backend.documents().is_empty());
    }

    #[tokio::test]
    async fn swallows_write_failures_without_error_hook() {
        let (logger, backend) = logger(options());
        backend.fail_writes(true);

        logger.log(test_record()).await;

        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn installs_missing_template() {
        let (ready, on_ready) = counter();
        let (logger, backend) = logger(options().with_on_ready(on_ready));

        logger.init().await;

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::TemplateExists(TEMPLATE_NAME.to_string()),
                BackendCall::PutTemplate(TEMPLATE_NAME.to_string()),
            ]
        );
        assert_eq!(backend.template(TEMPLATE_NAME), Some(logger.template()));
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keeps_existing_template() {
        let (ready, on_ready) = counter();
        let existing = build_template(TEMPLATE_NAME, 5, 5, &BTreeMap::new());
        let backend = Arc::new(InMemoryBackend::with_template(existing.clone()));
        let logger =
            RequestLogger::new(options().with_on_ready(on_ready), backend.clone()).unwrap();

        logger.init().await;

        assert_eq!(
            backend.calls(),
            vec![BackendCall::TemplateExists(TEMPLATE_NAME.to_string())]
        );
        assert_eq!(backend.template(TEMPLATE_NAME), Some(existing));
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recreates_existing_template_when_clearing() {
        let (ready, on_ready) = counter();
        let existing = build_template(TEMPLATE_NAME, 5, 5, &BTreeMap::new());
        let backend = Arc::new(InMemoryBackend::with_template(existing));
        let logger = RequestLogger::new(
            options().with_clear_template(true).with_on_ready(on_ready),
            backend.clone(),
        )
        .unwrap();

        logger.init().await;

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::TemplateExists(TEMPLATE_NAME.to_string()),
                BackendCall::DeleteTemplate(TEMPLATE_NAME.to_string()),
                BackendCall::PutTemplate(TEMPLATE_NAME.to_string()),
            ]
        );
        let installed = backend.template(TEMPLATE_NAME).unwrap();
        assert_eq!(installed, logger.template());
        assert_eq!(installed.settings.index.number_of_shards, 1);
        assert!(installed.mappings.properties.contains_key("userId"));
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signals_readiness_after_provisioning_failure() {
        let (ready, on_ready) = counter();
        let (failures, on_error) = counter();
        let (logger, backend) = logger(
            options()
                .with_on_ready(on_ready)
                .with_on_error(move |_| on_error()),
        );
        backend.fail_templates(true);

        logger.init().await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn classifies_provisioning_failures() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (logger, backend) = logger(options().with_on_error({
            let errors = errors.clone();
            move |error: &LoggerError| {
                errors
                    .lock()
                    .unwrap()
                    .push(matches!(error, LoggerError::Provisioning { .. }))
            }
        }));
        backend.fail_templates(true);

        logger.init().await;

        assert_eq!(*errors.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn handler_provisions_in_background_and_logs() {
        let (ready, on_ready) = counter();
        let backend = Arc::new(InMemoryBackend::new());
        let log = create_logger_with_backend(
            options().with_on_ready(on_ready),
            backend.clone(),
        )
        .unwrap();

        log(test_record()).await;

        for _ in 0..100 {
            if ready.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert!(backend.template(TEMPLATE_NAME).is_some());
        assert_eq!(backend.documents().len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_options() {
        let backend = Arc::new(InMemoryBackend::new());
        let result = create_logger_with_backend(
            options().with_index_time_format("%Q"),
            backend.clone(),
        );

        assert!(result.is_err());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn requires_a_runtime() {
        let result =
            create_logger_with_backend(options(), Arc::new(InMemoryBackend::new()));

        assert!(result.is_err());
    }
}
