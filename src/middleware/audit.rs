//! Automatic audit logging of mutating requests
//!
//! [`audit_middleware`] observes every request. Successful POST, PUT, PATCH
//! and DELETE requests against a known resource path are recorded once the
//! response has been produced; the write happens on a background task so the
//! client never waits for it.
//!
//! Handlers that know the real before/after state use [`AuditScope`] instead.
//! Any hook call through the scope marks the request as manually audited and
//! the middleware then stays silent for that request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header::USER_AGENT, request::Parts, Extensions, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::middleware::auth::AuthUser;
use crate::models::{AuditEntry, ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE, UNKNOWN};
use crate::services::{AuditContext, AuditEvent, AuditService};
use crate::utils::AppError;
use crate::AppState;

/// Requests under this prefix are never audited automatically
pub const AUDIT_API_PREFIX: &str = "/api/audit";

/// Audited path prefixes and the resource type recorded for each
pub const RESOURCE_ROUTES: &[(&str, &str)] = &[
    ("/api/farmers", "farmer"),
    ("/api/crops", "crop"),
    ("/api/barangays", "barangay"),
    ("/api/pests", "pest"),
    ("/api/reports", "report"),
    ("/api/auth/register", "user_registration"),
    ("/api/auth/login", "user_login"),
];

/// Set once a handler has written its own audit entry for the request
#[derive(Debug, Clone, Default)]
pub struct ManualAuditFlag(Arc<AtomicBool>);

impl ManualAuditFlag {
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Actor and provenance of a request
pub fn request_context(headers: &HeaderMap, extensions: &Extensions) -> AuditContext {
    let user = extensions.get::<AuthUser>();

    AuditContext {
        user_id: user.map(|u| u.id.clone()).filter(|s| !s.is_empty()),
        user_email: user.map(|u| u.email.clone()).filter(|s| !s.is_empty()),
        ip_address: client_ip(headers, extensions),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string(),
    }
}

fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Action recorded for a mutating method
pub fn action_for(method: &Method) -> Option<&'static str> {
    match *method {
        Method::POST => Some(ACTION_CREATE),
        Method::PUT | Method::PATCH => Some(ACTION_UPDATE),
        Method::DELETE => Some(ACTION_DELETE),
        _ => None,
    }
}

/// Resource type and path id of an audited path.
///
/// The longest matching prefix wins and prefixes only match on segment
/// boundaries, so `/api/farmersx` is not a farmer path.
pub fn resolve_resource(path: &str) -> Option<(&'static str, Option<String>)> {
    RESOURCE_ROUTES
        .iter()
        .filter_map(|(prefix, resource_type)| {
            let rest = path.strip_prefix(prefix)?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return None;
            }
            Some((prefix.len(), *resource_type, rest))
        })
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, resource_type, rest)| {
            let id = rest
                .split('/')
                .find(|s| !s.is_empty())
                .map(str::to_string);
            (resource_type, id)
        })
}

/// Identifier of the affected record as reported in a response body
pub fn response_resource_id(body: &Value) -> Option<String> {
    let as_id = |v: &Value| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    let data = body.get("data");
    [
        data.and_then(|d| d.get("_id")),
        data.and_then(|d| d.get("id")),
        body.get("_id"),
        body.get("id"),
    ]
    .into_iter()
    .flatten()
    .find_map(as_id)
}

struct AuditTarget {
    action: &'static str,
    resource_type: &'static str,
    resource_id: Option<String>,
}

fn audit_target(method: &Method, path: &str) -> Option<AuditTarget> {
    if path.starts_with(AUDIT_API_PREFIX) {
        return None;
    }
    let action = action_for(method)?;
    let (resource_type, resource_id) = resolve_resource(path)?;
    Some(AuditTarget {
        action,
        resource_type,
        resource_id,
    })
}

#[derive(Debug)]
enum BodyError {
    TooLarge,
    Read(BoxError),
}

/// Read a body of at most `limit` bytes.
///
/// Reading stops at the first frame past the limit; a declared length above
/// the limit is rejected before anything is read.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge);
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e)),
    }
}

fn body_fits(body: &Body, limit: usize) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|upper| upper <= limit as u64)
}

/// Request interceptor recording successful mutations
pub async fn audit_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let context = request_context(request.headers(), request.extensions());
    let flag = ManualAuditFlag::default();
    request.extensions_mut().insert(context.clone());
    request.extensions_mut().insert(flag.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(target) = audit_target(&method, &path) else {
        return next.run(request).await;
    };

    let limit = state.config.audit.max_body_bytes;
    let (parts, body) = request.into_parts();
    let request_body = match read_body(body, limit).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            return AppError::payload_too_large(format!(
                "Request body exceeds {} bytes",
                limit
            ))
            .into_response();
        }
        Err(BodyError::Read(e)) => {
            warn!(error = %e, method = %method, path = %path, "Failed to read request body");
            return AppError::bad_request("Failed to read request body").into_response();
        }
    };
    let request = Request::from_parts(parts, Body::from(request_body.clone()));

    let response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        return response;
    }
    if flag.is_set() {
        debug!(method = %method, path = %path, "Request audited by handler");
        return response;
    }

    let (response, resource_id) = match target.resource_id {
        Some(id) => (response, Some(id)),
        None if body_fits(response.body(), limit) => {
            let (parts, body) = response.into_parts();
            let bytes = match read_body(body, limit).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = ?e, path = %path, "Failed to capture response body for audit");
                    Bytes::new()
                }
            };
            let id = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .as_ref()
                .and_then(response_resource_id);
            (Response::from_parts(parts, Body::from(bytes)), id)
        }
        None => {
            debug!(path = %path, "Response too large to inspect for a resource id");
            (response, None)
        }
    };

    let mut event = AuditEvent::new(target.action, target.resource_type)
        .resource_id(resource_id)
        .metadata(json!({
            "httpMethod": method.as_str(),
            "url": path,
            "statusCode": status.as_u16(),
            "responseTime": started.elapsed().as_millis() as u64,
            "userAgent": context.user_agent.as_str(),
        }))
        .context(context);
    if let Ok(new_data) = serde_json::from_slice::<Value>(&request_body) {
        event = event.new_data(new_data);
    }

    state.audit.spawn_record(event);

    response
}

/// Manual audit hooks for handlers.
///
/// Every call marks the request as audited so the interceptor does not record
/// a second, generic entry for it.
pub struct AuditScope {
    service: AuditService,
    context: AuditContext,
    flag: Option<ManualAuditFlag>,
}

impl FromRequestParts<AppState> for AuditScope {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuditContext>()
            .cloned()
            .unwrap_or_else(|| request_context(&parts.headers, &parts.extensions));

        Ok(Self {
            service: state.audit.clone(),
            context,
            flag: parts.extensions.get::<ManualAuditFlag>().cloned(),
        })
    }
}

impl AuditScope {
    pub fn context(&self) -> &AuditContext {
        &self.context
    }

    fn claim(&self) {
        if let Some(ref flag) = self.flag {
            flag.mark();
        }
    }

    pub async fn create(&self, resource_type: &str, resource_id: &str, new_data: Value) -> Option<AuditEntry> {
        self.claim();
        self.service
            .log_create(resource_type, resource_id, new_data, &self.context)
            .await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        resource_id: &str,
        old_data: Value,
        new_data: Value,
    ) -> Option<AuditEntry> {
        self.claim();
        self.service
            .log_update(resource_type, resource_id, old_data, new_data, &self.context)
            .await
    }

    pub async fn delete(&self, resource_type: &str, resource_id: &str, old_data: Value) -> Option<AuditEntry> {
        self.claim();
        self.service
            .log_delete(resource_type, resource_id, old_data, &self.context)
            .await
    }

    pub async fn read(&self, resource_type: &str, resource_id: Option<&str>) -> Option<AuditEntry> {
        self.claim();
        self.service
            .log_read(resource_type, resource_id, &self.context)
            .await
    }

    pub async fn failure(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        err: &anyhow::Error,
    ) -> Option<AuditEntry> {
        self.claim();
        self.service
            .log_failure(action, resource_type, resource_id, err, &self.context)
            .await
    }
}
