//! Request/response adapter.
//!
//! Payload extraction, in order:
//! 1. query params: allow-listed names become header fields, the rest go
//!    into `data` as strings
//! 2. body `data` object, merged over the query fields
//! 3. allow-listed names at the top level of the body override the query
//! 4. uploaded files land in `data._files`
//!
//! The status line is always 200; success and failure are reported by the
//! envelope alone.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Path, Request, State, rejection::PathRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use micro_protocol::{
    CallError, CallPayload, CallTarget, Envelope, ErrorKind, HttpContext, NativeContext, Origin,
    Reply, ResponseWriter, TakeOver,
};
use serde_json::{Map, Value, json};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, error, warn};

use crate::server::{AppState, CallHandler, TransportConfig};

/// Reserved `data` key for uploaded files.
pub const FILES_KEY: &str = "_files";

const TAKE_OVER_BUFFER: usize = 32;

/// Request details kept for a possible takeover.
struct RequestMeta {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
}

/// Body fields relevant to the payload, regardless of encoding.
#[derive(Default)]
struct ParsedBody {
    fields: Map<String, Value>,
    files: Option<Vec<Value>>,
    raw: Bytes,
}

pub(crate) async fn call_handler<H: CallHandler>(
    State(state): State<Arc<AppState<H>>>,
    path: Result<Path<(String, String, String)>, PathRejection>,
    request: Request,
) -> Response {
    // Segments that do not even decode fail the identifier gate.
    let Ok(Path((service, logic, function))) = path else {
        debug!("Undecodable call path: {}", request.uri().path());
        return envelope_response(Envelope::failure(&CallError::invalid_request()));
    };
    let target = CallTarget::new(service, logic, function);
    let meta = request_meta(&request);

    let body = match parse_body(&state.config, request).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected body for {target}: {e}");
            return envelope_response(Envelope::failure(&e));
        }
    };

    let payload = build_payload(&state.config.allow_headers, &meta.query, &body);
    debug!("HTTP {} {target}", meta.method);

    match state.handler.handle_call(target.clone(), payload).await {
        Ok(Reply::Value(value)) => envelope_response(Envelope::success(value)),
        Ok(Reply::TakeOver(take_over)) => take_over_response(take_over, meta, body.raw).await,
        Err(e) => {
            if e.kind == ErrorKind::Domain {
                error!("{target} failed: {e}");
            } else {
                debug!("{target} rejected: {e}");
            }
            envelope_response(Envelope::failure(&e))
        }
    }
}

fn envelope_response(envelope: Envelope) -> Response {
    (StatusCode::OK, Json(envelope)).into_response()
}

fn request_meta(request: &Request) -> RequestMeta {
    let query: Vec<(String, String)> = request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    RequestMeta {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query,
        headers: header_map(request.headers()),
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn content_type(request: &Request) -> String {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default()
}

async fn parse_body(config: &TransportConfig, request: Request) -> Result<ParsedBody, CallError> {
    let content_type = content_type(&request);

    if content_type.starts_with("multipart/form-data") {
        if !config.upload_enabled {
            return Ok(ParsedBody::default());
        }
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| body_error(e.body_text()))?;
        return parse_multipart(&config.allow_headers, multipart).await;
    }

    let raw = axum::body::to_bytes(request.into_body(), config.max_body_bytes)
        .await
        .map_err(|e| body_error(e.to_string()).with_code(413))?;

    let fields = if raw.is_empty() {
        Map::new()
    } else if content_type.starts_with("application/json") {
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(body_error(format!("Invalid JSON body: {e}"))),
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        form_fields(url::form_urlencoded::parse(&raw).into_owned())
    } else {
        Map::new()
    };

    Ok(ParsedBody {
        fields,
        files: None,
        raw,
    })
}

fn body_error(message: impl Into<String>) -> CallError {
    CallError::new(ErrorKind::InvalidRequest, message)
}

/// Flat form fields. `data[key]=value` pairs and a JSON-encoded `data`
/// field both populate the nested `data` object.
fn form_fields(pairs: impl IntoIterator<Item = (String, String)>) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut data = Map::new();

    for (key, value) in pairs {
        if let Some(inner) = key.strip_prefix("data[").and_then(|k| k.strip_suffix(']')) {
            data.insert(inner.to_string(), Value::String(value));
        } else if key == "data" {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&value) {
                data.extend(map);
            }
        } else {
            fields.insert(key, Value::String(value));
        }
    }

    if !data.is_empty() {
        fields.insert("data".into(), Value::Object(data));
    }
    fields
}

async fn parse_multipart(
    allow_headers: &[String],
    mut multipart: Multipart,
) -> Result<ParsedBody, CallError> {
    let mut pairs = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| body_error(e.body_text()))?;
            files.push(json!({
                "fieldName": name,
                "fileName": file_name,
                "contentType": content_type,
                "size": bytes.len(),
                "content": base64::engine::general_purpose::STANDARD.encode(&bytes),
            }));
            continue;
        }

        let text = field.text().await.map_err(|e| body_error(e.body_text()))?;
        if name == "data" || name.starts_with("data[") || allow_headers.contains(&name) {
            pairs.push((name, text));
        }
    }

    Ok(ParsedBody {
        fields: form_fields(pairs),
        files: (!files.is_empty()).then_some(files),
        raw: Bytes::new(),
    })
}

/// Header-like field as a string. `null` clears it; other non-strings are
/// kept in their JSON text form.
pub(crate) fn header_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_payload(
    allow_headers: &[String],
    query: &[(String, String)],
    body: &ParsedBody,
) -> CallPayload {
    let mut payload = CallPayload::new(Origin::Api);
    let mut data = Map::new();

    for (key, value) in query {
        if allow_headers.contains(key) {
            payload.set_header(key, Some(value.clone()));
        } else {
            data.insert(key.clone(), Value::String(value.clone()));
        }
    }

    if let Some(Value::Object(body_data)) = body.fields.get("data") {
        data.extend(body_data.clone());
    }

    for name in allow_headers {
        if let Some(value) = body.fields.get(name) {
            payload.set_header(name, header_value(value));
        }
    }

    if let Some(files) = &body.files {
        data.insert(FILES_KEY.into(), Value::Array(files.clone()));
    }

    payload.data = Value::Object(data);
    payload
}

/// Run a takeover and stream whatever it writes.
async fn take_over_response(take_over: TakeOver, meta: RequestMeta, body: Bytes) -> Response {
    let (writer, pending) = ResponseWriter::channel(TAKE_OVER_BUFFER);
    let ctx = HttpContext {
        method: meta.method,
        path: meta.path,
        query: meta.query.into_iter().collect(),
        headers: meta.headers,
        body,
        response: writer,
    };

    tokio::spawn(take_over.run(NativeContext::Http(ctx)));

    // A writer dropped without writing anything yields an empty 200.
    let head = pending.head.await.unwrap_or_default();

    let mut builder = Response::builder().status(head.status);
    for (name, value) in head.headers {
        builder = builder.header(name, value);
    }

    let stream = ReceiverStream::new(pending.body).map(Ok::<_, Infallible>);
    builder.body(Body::from_stream(stream)).unwrap_or_else(|e| {
        error!("Takeover produced an invalid response head: {e}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
