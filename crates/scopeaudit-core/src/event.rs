//! Audit event types and structures

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level field names owned by [`AuditEvent`]. Sections may not use them.
pub const RESERVED_FIELDS: &[&str] = &[
    "event_type",
    "environment",
    "start_date",
    "end_date",
    "duration_ms",
    "comments",
    "custom_fields",
];

/// Process and caller information captured when an event is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEnvironment {
    /// Name of the OS user running the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Host name of the machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    /// Method or operation that opened the scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calling_method: Option<String>,
    /// Error description, if the observed operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl AuditEnvironment {
    /// Capture user and machine names from the process environment.
    pub fn capture() -> Self {
        let user_name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        let machine_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok();

        Self {
            user_name,
            machine_name,
            calling_method: None,
            exception: None,
        }
    }

    /// Set the calling method.
    pub fn calling_method(mut self, method: impl Into<String>) -> Self {
        self.calling_method = Some(method.into());
        self
    }
}

/// Structured record of one observed unit of work.
///
/// Besides the envelope fields, an event holds any number of named
/// *sections*: free-form JSON payloads such as an `"action"` section with
/// controller, action and response data. Sections are flattened into the
/// top-level JSON object when the event is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type name (e.g. `"GET home/index"`).
    pub event_type: String,
    /// Process and caller information.
    #[serde(default)]
    pub environment: AuditEnvironment,
    /// When the scope was created.
    pub start_date: DateTime<Utc>,
    /// When the scope was ended. Unset until finalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Elapsed milliseconds between start and end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Free text comments added while the operation ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    /// Custom fields added by application code.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, Value>,
    /// Named sections.
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Create a new event of the given type, stamped with the current time.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            environment: AuditEnvironment::capture(),
            start_date: Utc::now(),
            end_date: None,
            duration_ms: None,
            comments: Vec::new(),
            custom_fields: BTreeMap::new(),
            sections: BTreeMap::new(),
        }
    }

    /// Set the environment information.
    pub fn environment(mut self, environment: AuditEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Add a section. Reserved names are ignored.
    pub fn section(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if is_reserved(&name) {
            tracing::warn!(section = %name, "Ignoring section with a reserved name");
        } else {
            self.sections.insert(name, value.into());
        }
        self
    }

    /// Add a comment.
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comments.push(text.into());
        self
    }

    /// Add a custom field.
    pub fn custom_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    /// Raw JSON of a section.
    pub fn section_value(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Mutable raw JSON of a section.
    pub fn section_value_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.sections.get_mut(name)
    }

    /// Deserialize a section into `T`. `Ok(None)` when the section is absent.
    pub fn typed_section<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.sections
            .get(name)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    /// Serialize `value` into the named section, replacing any previous payload.
    ///
    /// # Errors
    ///
    /// Fails when `value` cannot be serialized or `name` collides with one of
    /// the [`RESERVED_FIELDS`].
    pub fn set_section<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "`{}` is a reserved audit event field",
                name
            )));
        }
        let value = serde_json::to_value(value)?;
        self.sections.insert(name, value);
        Ok(())
    }

    /// Remove a section, returning its payload.
    pub fn remove_section(&mut self, name: &str) -> Option<Value> {
        self.sections.remove(name)
    }

    /// Whether the end date has been stamped.
    pub fn is_finalized(&self) -> bool {
        self.end_date.is_some()
    }

    /// Stamp the end date and duration.
    pub(crate) fn finalize(&mut self, now: DateTime<Utc>) {
        self.end_date = Some(now);
        self.duration_ms = Some((now - self.start_date).num_milliseconds().max(0));
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}
