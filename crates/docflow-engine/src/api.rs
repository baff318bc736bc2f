//! Whitelisted method surface
//!
//! Outside callers reach the engine only through methods registered here by
//! name. Every invocation carries an actor, passes a role gate before the
//! method body runs, and returns a structured [`ApiResponse`]. User-facing
//! failures keep their message; internal failures are logged in full and
//! masked with a generic message so store or hook internals never leak to
//! callers.

use crate::engine::LifecycleEngine;
use crate::error::EngineError;
use async_trait::async_trait;
use docflow_perm::Actor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Coarse classification of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// The document was rejected by validation
    Validation,
    /// The actor lacks permission
    Permission,
    /// Method or document not found
    NotFound,
    /// The requested transition is not allowed from the current status
    Conflict,
    /// Anything else; details are in the server log, not the response
    Internal,
}

/// Structured failure in an [`ApiResponse`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Classification of the failure
    pub kind: ApiErrorKind,
    /// Message safe to show the caller
    pub message: String,
}

/// Envelope returned by every whitelisted method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the invocation succeeded
    pub ok: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Failure details otherwise
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying a payload
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response
    #[must_use]
    pub fn failure(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ApiError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Convert an engine error, masking non-user-facing details
    #[must_use]
    pub fn from_engine_error(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Validation(_) => ApiErrorKind::Validation,
            EngineError::Permission(_) => ApiErrorKind::Permission,
            EngineError::NotFound { .. } => ApiErrorKind::NotFound,
            EngineError::IllegalTransition { .. } => ApiErrorKind::Conflict,
            _ => ApiErrorKind::Internal,
        };
        if err.is_user_facing() {
            Self::failure(kind, err.to_string())
        } else {
            tracing::error!(error = %err, "internal error during method invocation");
            Self::failure(kind, "an internal error occurred")
        }
    }
}

/// A method callable by name through [`Api::invoke`]
///
/// Methods not registered here simply do not exist to callers; there is no
/// way to reach engine internals by guessing names.
#[async_trait]
pub trait ApiMethod: Send + Sync {
    /// Roles allowed to invoke the method; empty means any authenticated
    /// actor
    fn allowed_roles(&self) -> &[String] {
        &[]
    }

    /// Execute the method
    async fn call(
        &self,
        actor: &Actor,
        engine: &Arc<LifecycleEngine>,
        args: Value,
    ) -> Result<Value, EngineError>;
}

/// Builder for [`Api`]
pub struct ApiBuilder {
    engine: Arc<LifecycleEngine>,
    methods: HashMap<String, Arc<dyn ApiMethod>>,
}

impl ApiBuilder {
    /// Whitelist a method under a name
    ///
    /// A later registration under the same name replaces the earlier one.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, method: Arc<dyn ApiMethod>) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    /// Freeze the surface
    #[must_use]
    pub fn build(self) -> Api {
        Api {
            engine: self.engine,
            methods: self.methods,
        }
    }
}

/// The whitelisted method surface over one engine
pub struct Api {
    engine: Arc<LifecycleEngine>,
    methods: HashMap<String, Arc<dyn ApiMethod>>,
}

impl Api {
    /// Start building a surface over an engine
    #[must_use]
    pub fn builder(engine: Arc<LifecycleEngine>) -> ApiBuilder {
        ApiBuilder {
            engine,
            methods: HashMap::new(),
        }
    }

    /// The engine behind this surface
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<LifecycleEngine> {
        &self.engine
    }

    /// Names of whitelisted methods
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Invoke a whitelisted method by name
    ///
    /// Unknown names and failed role gates come back as structured failures;
    /// this never panics and never returns a raw engine error.
    pub async fn invoke(&self, actor: &Actor, name: &str, args: Value) -> ApiResponse<Value> {
        let Some(method) = self.methods.get(name) else {
            return ApiResponse::failure(ApiErrorKind::NotFound, format!("unknown method '{name}'"));
        };

        let roles = method.allowed_roles();
        if !roles.is_empty()
            && !actor.is_administrator()
            && !actor.has_any_role(roles.iter().map(String::as_str))
        {
            tracing::debug!(user = %actor.user, method = name, "method role gate denied");
            return ApiResponse::failure(
                ApiErrorKind::Permission,
                format!("not permitted to call '{name}'"),
            );
        }

        tracing::debug!(user = %actor.user, method = name, "invoking method");
        match method.call(actor, &self.engine, args).await {
            Ok(data) => ApiResponse::success(data),
            Err(err) => ApiResponse::from_engine_error(&err),
        }
    }
}
