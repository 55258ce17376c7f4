//! Action audit filter
//!
//! Drives one audit scope per request through the three hooks a
//! controller/action pipeline offers: before the action runs, after it ran,
//! and after its result was written.

use crate::action::{ActionEventExt, AuditAction};
use crate::context::ActionContext;
use crate::error::{ActionAuditError, Result};
use scopeaudit_core::{
    AuditConfig, AuditEvent, AuditScope, AuditScopeOptions, CreationPolicy, DataProvider,
    ScopeRegistry, SharedScope,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default event type template.
pub const DEFAULT_EVENT_TYPE: &str = "{verb} {controller}/{action}";

/// Result of running the action, reported to [`ActionAuditFilter::on_action_executed`].
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Model validation errors by field. Empty means the model state is valid.
    pub model_state_errors: BTreeMap<String, String>,
    /// Value returned by the action.
    pub result: Option<Value>,
    /// Error raised by the action.
    pub exception: Option<String>,
}

impl ActionOutcome {
    /// A successful outcome without a result value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value returned by the action.
    pub fn result(mut self, result: impl Into<Value>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Add a model validation error.
    pub fn model_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.model_state_errors.insert(field.into(), message.into());
        self
    }

    /// Set the error raised by the action.
    pub fn exception(mut self, message: impl Into<String>) -> Self {
        self.exception = Some(message.into());
        self
    }
}

/// Audits controller actions as audit scopes.
///
/// Scopes are registered in a [`ScopeRegistry`] under the request id, so the
/// action itself can reach its scope through [`current_scope`](Self::current_scope).
///
/// ```rust,no_run
/// use http::{Method, StatusCode};
/// use scopeaudit_action::{ActionAuditFilter, ActionContext, ActionOutcome};
/// use scopeaudit_core::{CreationPolicy, InMemoryDataProvider};
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
///
/// # async fn run() -> scopeaudit_action::Result<()> {
/// let filter = ActionAuditFilter::new()
///     .data_provider(Arc::new(InMemoryDataProvider::new()))
///     .creation_policy(CreationPolicy::InsertOnEnd)
///     .include_headers(true);
///
/// let ctx = ActionContext::new(
///     "req-1",
///     Method::GET,
///     "http://localhost/home/index".parse().unwrap(),
///     "home",
///     "index",
/// );
/// filter.on_action_executing(&ctx, BTreeMap::new()).await?;
/// filter.on_action_executed(&ctx, ActionOutcome::new()).await?;
/// filter.on_result_executed(&ctx, StatusCode::OK).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ActionAuditFilter {
    provider: Option<Arc<dyn DataProvider>>,
    policy: CreationPolicy,
    registry: Arc<ScopeRegistry<String>>,
    include_headers: bool,
    include_model: bool,
    event_type_name: String,
}

impl Default for ActionAuditFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionAuditFilter {
    /// A filter with no data provider, the default policy and its own registry.
    pub fn new() -> Self {
        Self {
            provider: None,
            policy: CreationPolicy::default(),
            registry: Arc::new(ScopeRegistry::new()),
            include_headers: false,
            include_model: false,
            event_type_name: DEFAULT_EVENT_TYPE.to_string(),
        }
    }

    /// A filter using the policy and provider selected by `config`.
    ///
    /// # Errors
    ///
    /// Configuration errors from building the provider.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Ok(Self::new()
            .creation_policy(config.creation_policy)
            .data_provider(config.build_provider()?))
    }

    /// Set the data provider.
    pub fn data_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the creation policy.
    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a registry with other components.
    pub fn registry(mut self, registry: Arc<ScopeRegistry<String>>) -> Self {
        self.registry = registry;
        self
    }

    /// Record request headers in the action section.
    pub fn include_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    /// Record the action's return value in the action section.
    pub fn include_model(mut self, include: bool) -> Self {
        self.include_model = include;
        self
    }

    /// Event type template. `{verb}`, `{controller}` and `{action}` are
    /// replaced by the request's values.
    pub fn event_type_name(mut self, template: impl Into<String>) -> Self {
        self.event_type_name = template.into();
        self
    }

    /// The registry holding the active scopes.
    pub fn scopes(&self) -> &Arc<ScopeRegistry<String>> {
        &self.registry
    }

    /// The scope of the request, while it is in flight.
    pub fn current_scope(&self, ctx: &ActionContext) -> Option<SharedScope> {
        self.registry.retrieve(&ctx.request_id)
    }

    /// Before the action runs: open the scope and register it.
    ///
    /// # Errors
    ///
    /// A configuration error without a data provider, or the error of the
    /// start-insert.
    pub async fn on_action_executing(
        &self,
        ctx: &ActionContext,
        arguments: BTreeMap<String, Value>,
    ) -> Result<SharedScope> {
        let action = AuditAction {
            trace_id: ctx.trace_id.clone(),
            http_method: ctx.method.to_string(),
            request_url: ctx.request_url(),
            user_name: ctx.user_name.clone(),
            ip_address: ctx.remote_ip.map(|ip| ip.to_string()),
            controller_name: ctx.controller_name.clone(),
            action_name: ctx.action_name.clone(),
            action_parameters: arguments,
            headers: self.include_headers.then(|| ctx.header_map()),
            ..AuditAction::default()
        };

        let mut event = AuditEvent::new(self.event_type(ctx));
        event.environment.calling_method =
            Some(format!("{}.{}", ctx.controller_name, ctx.action_name));
        event.set_audit_action(&action)?;

        let mut options = AuditScopeOptions::from_event(event).policy(self.policy);
        if let Some(provider) = &self.provider {
            options = options.data_provider(Arc::clone(provider));
        }
        let scope = AuditScope::create(options).await?;

        tracing::debug!(
            request_id = %ctx.request_id,
            event_type = %scope.event_type(),
            policy = %self.policy,
            "Audit scope opened for action"
        );
        let (shared, previous) = self.registry.attach(ctx.request_id.clone(), scope);
        if let Some(previous) = previous {
            previous.lock().await.discard();
        }
        Ok(shared)
    }

    /// After the action ran: record model state, result and exception.
    ///
    /// # Errors
    ///
    /// [`ActionAuditError::ScopeNotFound`] when no scope is attached.
    pub async fn on_action_executed(&self, ctx: &ActionContext, outcome: ActionOutcome) -> Result<()> {
        let shared = self.scope_for(ctx)?;
        let mut scope = shared.lock().await;

        let mut action = read_action(scope.event())?;
        action.model_state_valid = Some(outcome.model_state_errors.is_empty());
        action.model_state_errors = outcome.model_state_errors;
        if self.include_model {
            action.action_result = outcome.result;
        }
        if let Some(exception) = outcome.exception {
            scope.event_mut().environment.exception = Some(exception.clone());
            action.exception = Some(exception);
        }
        scope.event_mut().set_audit_action(&action)?;
        Ok(())
    }

    /// After the result was written: record the response status, end the
    /// scope, save it when the policy is manual, and unregister it.
    ///
    /// The scope is unregistered before it is written, so a second call for
    /// the same request fails with [`ActionAuditError::ScopeNotFound`]
    /// instead of writing again. On a write error the scope is registered
    /// again (unless a newer scope took the request id) so the call can be
    /// retried.
    ///
    /// # Errors
    ///
    /// [`ActionAuditError::ScopeNotFound`] when no scope is attached, or the
    /// error of the end write or the manual save.
    pub async fn on_result_executed(
        &self,
        ctx: &ActionContext,
        status: http::StatusCode,
    ) -> Result<SharedScope> {
        let shared = self
            .registry
            .detach(&ctx.request_id)
            .ok_or_else(|| ActionAuditError::ScopeNotFound(ctx.request_id.clone()))?;

        if let Err(err) = close_scope(&shared, status).await {
            if self
                .registry
                .attach_vacant(ctx.request_id.clone(), Arc::clone(&shared))
                .is_err()
            {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    "Request id reused before the failed audit scope could be restored"
                );
            }
            return Err(err);
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            status = status.as_u16(),
            "Audit scope closed for action"
        );
        Ok(shared)
    }

    /// The action failed and should not be audited: discard and unregister
    /// the scope. Returns the discarded scope, if one was attached.
    pub async fn on_action_failed(&self, ctx: &ActionContext) -> Option<SharedScope> {
        let shared = self.registry.detach(&ctx.request_id)?;
        shared.lock().await.discard();
        tracing::debug!(request_id = %ctx.request_id, "Audit scope discarded for action");
        Some(shared)
    }

    fn event_type(&self, ctx: &ActionContext) -> String {
        self.event_type_name
            .replace("{verb}", ctx.method.as_str())
            .replace("{controller}", &ctx.controller_name)
            .replace("{action}", &ctx.action_name)
    }

    fn scope_for(&self, ctx: &ActionContext) -> Result<SharedScope> {
        self.registry
            .retrieve(&ctx.request_id)
            .ok_or_else(|| ActionAuditError::ScopeNotFound(ctx.request_id.clone()))
    }
}

async fn close_scope(shared: &SharedScope, status: http::StatusCode) -> Result<()> {
    let mut scope = shared.lock().await;

    let mut action = read_action(scope.event())?;
    action.response_status_code = Some(status.as_u16());
    action.response_status = Some(status_text(status));
    scope.event_mut().set_audit_action(&action)?;

    scope.end().await?;
    if scope.policy() == CreationPolicy::Manual {
        scope.save().await?;
    }
    Ok(())
}

fn read_action(event: &AuditEvent) -> Result<AuditAction> {
    Ok(event.audit_action()?.unwrap_or_default())
}

fn status_text(status: http::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
