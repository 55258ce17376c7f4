//! Description of the in-flight request handed to the filter by the host.

use http::header::HOST;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use std::net::IpAddr;

/// What the filter needs to know about the request being handled.
///
/// The host builds one per request; `request_id` is the key under which the
/// request's audit scope is registered.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Unique id of the request; scope registry key.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Request URI, absolute or origin-form.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
    /// Name of the controller handling the request.
    pub controller_name: String,
    /// Name of the action handling the request.
    pub action_name: String,
    /// Authenticated user, if any.
    pub user_name: Option<String>,
    /// Remote address of the client.
    pub remote_ip: Option<IpAddr>,
    /// Trace/correlation id.
    pub trace_id: Option<String>,
}

impl ActionContext {
    /// Create a context for a request routed to `controller`/`action`.
    pub fn new(
        request_id: impl Into<String>,
        method: Method,
        uri: Uri,
        controller: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            method,
            uri,
            headers: HeaderMap::new(),
            controller_name: controller.into(),
            action_name: action.into(),
            user_name: None,
            remote_ip: None,
            trace_id: None,
        }
    }

    /// Add a request header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set the authenticated user.
    pub fn user(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Set the client address.
    pub fn remote_ip(mut self, ip: IpAddr) -> Self {
        self.remote_ip = Some(ip);
        self
    }

    /// Set the trace id.
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// `scheme://host/path` of the request, without the query string.
    ///
    /// Falls back to the `Host` header and `http` when the URI is in origin
    /// form.
    pub fn request_url(&self) -> String {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = self
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                self.headers
                    .get(HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        format!("{}://{}{}", scheme, host, self.uri.path())
    }

    /// Headers as name → value pairs. Non-UTF-8 values are skipped and
    /// repeated headers are joined with `", "`.
    pub fn header_map(&self) -> std::collections::BTreeMap<String, String> {
        let mut map = std::collections::BTreeMap::new();
        for (name, value) in &self.headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            map.entry(name.as_str().to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        map
    }
}
