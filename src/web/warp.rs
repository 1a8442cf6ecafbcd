use crate::logger::LogHandler;
use crate::logger::record::{ErrorDescriptor, LogRecord, ResponseEnvelope};
use serde_json::{Map, Value};
use warp::http::{HeaderMap, StatusCode};
use warp::log::{Info, Log};

/// Logs every request passing through the wrapped filter.
///
/// Warp does not expose the matched route template, so `spec` equals the request path.
/// Body, params and query are not available at this level and remain empty. Each record is
/// handed to `handler` on a separate task, so logging never delays the response.
///
/// ```rust,ignore
/// let log = index_logger::create_logger(options)?;
/// let routes = warp::path("hello")
///     .map(|| "Hello")
///     .with(index_logger::web::warp::request_log(log));
/// ```
pub fn request_log(handler: LogHandler) -> Log<impl Fn(Info<'_>) + Clone + Send> {
    warp::log::custom(move |info: Info<'_>| {
        let record = record_from_info(&info);
        tokio::spawn(handler(record));
    })
}

fn record_from_info(info: &Info<'_>) -> LogRecord {
    let status = info.status();

    LogRecord {
        status_code: status.as_u16(),
        method: info.method().as_str().to_string(),
        path: info.path().to_string(),
        spec: info.path().to_string(),
        headers: headers_as_json(info.request_headers()),
        took: Some(u64::try_from(info.elapsed().as_millis()).unwrap_or(u64::MAX)),
        response: ResponseEnvelope {
            error: error_for_status(status),
            ..ResponseEnvelope::default()
        },
        ..LogRecord::default()
    }
}

fn headers_as_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut result = Map::new();
    for name in headers.keys() {
        // Values which are not valid UTF-8 are dropped.
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();

        if !values.is_empty() {
            result.insert(name.as_str().to_string(), Value::String(values.join(", ")));
        }
    }

    result
}

fn error_for_status(status: StatusCode) -> Option<ErrorDescriptor> {
    if !status.is_client_error() && !status.is_server_error() {
        return None;
    }
    if status == StatusCode::NOT_FOUND {
        return Some(ErrorDescriptor::new("ERR_PAGE_NOT_FOUND", "Page not found"));
    }

    let reason = status.canonical_reason().unwrap_or("Unknown error");
    let code = format!("ERR_{}", reason.to_uppercase().replace([' ', '-', '\''], "_"));
    Some(ErrorDescriptor::new(code, reason))
}
