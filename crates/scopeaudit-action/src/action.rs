//! The `"action"` section recorded for each audited controller action.

use scopeaudit_core::AuditEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the event section holding the [`AuditAction`].
pub const ACTION_SECTION: &str = "action";

/// Request, action and response data of one controller action call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditAction {
    /// Trace/correlation id of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// HTTP method.
    pub http_method: String,
    /// `scheme://host/path` of the request.
    pub request_url: String,
    /// Authenticated user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Client address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Controller name.
    pub controller_name: String,
    /// Action name.
    pub action_name: String,
    /// Arguments bound to the action.
    #[serde(default)]
    pub action_parameters: BTreeMap<String, Value>,
    /// Request headers, when header capture is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Whether model binding/validation succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_state_valid: Option<bool>,
    /// Model validation errors by field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_state_errors: BTreeMap<String, String>,
    /// Value returned by the action, when model capture is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_result: Option<Value>,
    /// Error raised by the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Response status line text (e.g. `"200 OK"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    /// Response status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status_code: Option<u16>,
}

/// Access to the [`AuditAction`] section of an event.
pub trait ActionEventExt {
    /// Read the action section. `Ok(None)` when the event has none.
    fn audit_action(&self) -> Result<Option<AuditAction>, serde_json::Error>;

    /// Write the action section.
    fn set_audit_action(&mut self, action: &AuditAction) -> Result<(), serde_json::Error>;
}

impl ActionEventExt for AuditEvent {
    fn audit_action(&self) -> Result<Option<AuditAction>, serde_json::Error> {
        self.typed_section(ACTION_SECTION)
    }

    fn set_audit_action(&mut self, action: &AuditAction) -> Result<(), serde_json::Error> {
        self.set_section(ACTION_SECTION, action)
    }
}
