//! Call middleware.
//!
//! Middleware sees every call that passed the identifier, lookup and access
//! gates. `before` hooks may block the call; `after` hooks observe successful
//! plain results. Hooks run in priority order.

use std::future::Future;
use std::pin::Pin;

use micro_protocol::{CallPayload, CallTarget, Origin};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Whether a call may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareResult {
    pub allowed: bool,
    /// Reason given to the caller when blocked
    pub feedback: Option<String>,
}

impl MiddlewareResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            feedback: None,
        }
    }

    pub fn block(feedback: impl Into<String>) -> Self {
        Self {
            allowed: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// Trait for call middleware.
pub trait CallMiddleware: Send + Sync {
    fn before(
        &self,
        target: &CallTarget,
        payload: &CallPayload,
    ) -> impl Future<Output = MiddlewareResult> + Send;

    fn after(&self, _target: &CallTarget, _result: &Value) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe form of [`CallMiddleware`].
trait MiddlewareDyn: Send + Sync {
    fn before_dyn<'a>(
        &'a self,
        target: &'a CallTarget,
        payload: &'a CallPayload,
    ) -> BoxFuture<'a, MiddlewareResult>;

    fn after_dyn<'a>(&'a self, target: &'a CallTarget, result: &'a Value) -> BoxFuture<'a, ()>;

    fn name_dyn(&self) -> &str;
    fn priority_dyn(&self) -> i32;
}

impl<T: CallMiddleware> MiddlewareDyn for T {
    fn before_dyn<'a>(
        &'a self,
        target: &'a CallTarget,
        payload: &'a CallPayload,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(self.before(target, payload))
    }

    fn after_dyn<'a>(&'a self, target: &'a CallTarget, result: &'a Value) -> BoxFuture<'a, ()> {
        Box::pin(self.after(target, result))
    }

    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn priority_dyn(&self) -> i32 {
        self.priority()
    }
}

/// Middleware executed in priority order. Equal priorities keep insertion
/// order.
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn MiddlewareDyn>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: CallMiddleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
        self.middlewares.sort_by_key(|m| m.priority_dyn());
    }

    /// Stops at the first middleware that blocks.
    pub async fn run_before(&self, target: &CallTarget, payload: &CallPayload) -> MiddlewareResult {
        for mw in &self.middlewares {
            let result = mw.before_dyn(target, payload).await;
            if !result.allowed {
                debug!("{target} blocked by {}", mw.name_dyn());
                return result;
            }
        }
        MiddlewareResult::allow()
    }

    pub async fn run_after(&self, target: &CallTarget, result: &Value) {
        for mw in &self.middlewares {
            mw.after_dyn(target, result).await;
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name_dyn()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Which transports may reach the calls under `path`.
///
/// `path` is `service`, `service/logic` or `service/logic/function` in base
/// names. When `includes` is set only those origins pass; any origin in
/// `excludes` is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRule {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<Origin>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<Origin>,
}

impl OriginRule {
    fn matches(&self, target: &CallTarget) -> bool {
        let mut rule = self.path.trim_matches('/').split('/');
        let call = [
            target.service.as_str(),
            target.logic.as_str(),
            target.function.as_str(),
        ];
        let mut depth = 0;
        for segment in call {
            match rule.next() {
                Some(expected) if expected == segment => depth += 1,
                Some(_) => return false,
                None => break,
            }
        }
        depth > 0 && rule.next().is_none()
    }

    fn permits(&self, origin: Origin) -> bool {
        let included = self.includes.as_ref().is_none_or(|list| list.contains(&origin));
        included && !self.excludes.contains(&origin)
    }
}

/// Refuses calls whose origin a matching [`OriginRule`] does not permit.
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    rules: Vec<OriginRule>,
}

impl OriginGuard {
    pub fn new(rules: Vec<OriginRule>) -> Self {
        Self { rules }
    }

    pub fn rule(mut self, rule: OriginRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl CallMiddleware for OriginGuard {
    async fn before(&self, target: &CallTarget, payload: &CallPayload) -> MiddlewareResult {
        let refused = self
            .rules
            .iter()
            .any(|rule| rule.matches(target) && !rule.permits(payload.origin));
        if refused {
            MiddlewareResult::block(format!("{target} cannot be called from {}", payload.origin))
        } else {
            MiddlewareResult::allow()
        }
    }

    fn name(&self) -> &str {
        "origin-guard"
    }

    fn priority(&self) -> i32 {
        -10
    }
}

/// Debug-level trace of each dispatched call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallLogger;

impl CallMiddleware for CallLogger {
    async fn before(&self, target: &CallTarget, payload: &CallPayload) -> MiddlewareResult {
        debug!(
            origin = %payload.origin,
            authenticated = payload.token.is_some(),
            "dispatch {target}"
        );
        MiddlewareResult::allow()
    }

    async fn after(&self, target: &CallTarget, result: &Value) {
        debug!(kind = value_kind(result), "completed {target}");
    }

    fn name(&self) -> &str {
        "call-logger"
    }

    fn priority(&self) -> i32 {
        100
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn target(path: &str) -> CallTarget {
        CallTarget::parse(path).unwrap()
    }

    #[test]
    fn rule_matches_by_prefix_segments() {
        let rule = OriginRule {
            path: "auth/user".into(),
            ..Default::default()
        };
        assert!(rule.matches(&target("auth/user/list")));
        assert!(!rule.matches(&target("auth/admin/list")));
        assert!(!rule.matches(&target("billing/user/list")));

        let service_rule = OriginRule {
            path: "auth".into(),
            ..Default::default()
        };
        assert!(service_rule.matches(&target("auth/admin/list")));

        let too_deep = OriginRule {
            path: "auth/user/list/extra".into(),
            ..Default::default()
        };
        assert!(!too_deep.matches(&target("auth/user/list")));
    }

    #[tokio::test]
    async fn guard_applies_includes_and_excludes() {
        let guard = OriginGuard::default()
            .rule(OriginRule {
                path: "auth/user/list".into(),
                includes: Some(vec![Origin::Socket]),
                excludes: vec![],
            })
            .rule(OriginRule {
                path: "report".into(),
                includes: None,
                excludes: vec![Origin::Socket],
            });

        let api = CallPayload::new(Origin::Api);
        let socket = CallPayload::new(Origin::Socket);

        assert!(!guard.before(&target("auth/user/list"), &api).await.allowed);
        assert!(guard.before(&target("auth/user/list"), &socket).await.allowed);
        assert!(guard.before(&target("report/daily/get"), &api).await.allowed);
        assert!(!guard.before(&target("report/daily/get"), &socket).await.allowed);
        assert!(guard.before(&target("other/x/y"), &socket).await.allowed);
    }

    struct Counting {
        name: &'static str,
        priority: i32,
        block: bool,
        calls: Arc<AtomicUsize>,
    }

    impl CallMiddleware for Counting {
        async fn before(&self, _: &CallTarget, _: &CallPayload) -> MiddlewareResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.block {
                MiddlewareResult::block(self.name)
            } else {
                MiddlewareResult::allow()
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn chain_runs_in_priority_order_and_stops_on_block() {
        let late = Arc::new(AtomicUsize::new(0));
        let mut chain = MiddlewareChain::new();
        chain.add(Counting {
            name: "late",
            priority: 10,
            block: false,
            calls: late.clone(),
        });
        chain.add(Counting {
            name: "early",
            priority: -1,
            block: true,
            calls: Arc::new(AtomicUsize::new(0)),
        });

        assert_eq!(chain.names(), vec!["early", "late"]);

        let result = chain
            .run_before(&target("a/b/c"), &CallPayload::new(Origin::Api))
            .await;
        assert!(!result.allowed);
        assert_eq!(result.feedback.as_deref(), Some("early"));
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }
}
