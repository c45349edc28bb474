//! Call router: resolves a call against the registry and runs it.
//!
//! Gates, in order:
//! 1. identifier: every segment must be a strict identifier
//! 2. lookup: the triple must be registered
//! 3. access: restricted entries need the configured token
//! 4. middleware `before` chain
//!
//! Handler errors propagate unchanged; turning them into envelopes is the
//! adapters' job.

use std::sync::Arc;

use micro_protocol::{CallError, CallPayload, CallResult, CallTarget, Reply};
use micro_services::Registry;
use micro_transport::CallHandler;
use serde_json::{Value, json};
use tracing::debug;

use crate::middleware::{CallMiddleware, MiddlewareChain};

/// Routes calls from any transport into the registry.
pub struct CallRouter {
    registry: Arc<Registry>,
    /// Token required by restricted entries; `None` leaves them open
    restriction_token: Option<String>,
    middleware: MiddlewareChain,
}

impl CallRouter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            restriction_token: None,
            middleware: MiddlewareChain::new(),
        }
    }

    pub fn with_restriction_token(mut self, token: Option<String>) -> Self {
        self.restriction_token = token;
        self
    }

    pub fn add_middleware<M: CallMiddleware + 'static>(&mut self, middleware: M) {
        self.middleware.add(middleware);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Resolve and invoke `service/logic/function`.
    pub async fn route(
        &self,
        service: &str,
        logic: &str,
        function: &str,
        payload: CallPayload,
    ) -> CallResult {
        self.dispatch(CallTarget::new(service, logic, function), payload)
            .await
    }

    async fn dispatch(&self, target: CallTarget, payload: CallPayload) -> CallResult {
        if !target.is_valid() {
            debug!("Rejected malformed call path: {target}");
            return Err(CallError::invalid_request());
        }

        let entry = self
            .registry
            .get(&target.service, &target.logic, &target.function)
            .ok_or_else(|| CallError::not_found(&target.to_string()))?;

        if let Some(expected) = &self.restriction_token {
            if entry.is_restricted() && payload.token.as_deref() != Some(expected.as_str()) {
                return Err(CallError::unauthorized());
            }
        }

        let verdict = self.middleware.run_before(&target, &payload).await;
        if !verdict.allowed {
            return Err(CallError::forbidden(
                verdict
                    .feedback
                    .unwrap_or_else(|| "Call blocked by middleware".into()),
            ));
        }

        let reply = entry.invoke(payload).await?;

        if let Reply::Value(value) = &reply {
            self.middleware.run_after(&target, value).await;
        }

        Ok(reply)
    }
}

impl CallHandler for CallRouter {
    async fn handle_call(&self, target: CallTarget, payload: CallPayload) -> CallResult {
        self.dispatch(target, payload).await
    }

    fn describe(&self) -> Value {
        json!({
            "functions": self.registry.len(),
            "paths": self.registry.paths(),
        })
    }
}

impl std::fmt::Debug for CallRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRouter")
            .field("functions", &self.registry.len())
            .field("restricted", &self.restriction_token.is_some())
            .field("middleware", &self.middleware)
            .finish()
    }
}
