//! What a handler hands back: a value to wrap, or a takeover of the
//! transport's response writing.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::context::NativeContext;
use crate::error::CallError;

/// Result of invoking a registered function.
pub type CallResult = Result<Reply, CallError>;

type TakeOverFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handler that writes the response itself, given the native context of
/// whichever transport carried the call.
pub struct TakeOver(Box<dyn FnOnce(NativeContext) -> TakeOverFuture + Send>);

impl TakeOver {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(NativeContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Hand the context over. The returned future drives the response.
    pub fn run(self, ctx: NativeContext) -> impl Future<Output = ()> + Send {
        (self.0)(ctx)
    }
}

impl std::fmt::Debug for TakeOver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TakeOver(..)")
    }
}

/// A handler's successful outcome.
#[derive(Debug)]
pub enum Reply {
    /// Wrapped into a success envelope by the adapter.
    Value(Value),
    /// Bypasses the envelope entirely.
    TakeOver(TakeOver),
}

impl Reply {
    pub fn take_over<F, Fut>(f: F) -> Self
    where
        F: FnOnce(NativeContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::TakeOver(TakeOver::new(f))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::TakeOver(_) => None,
        }
    }

    pub fn is_take_over(&self) -> bool {
        matches!(self, Self::TakeOver(_))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<TakeOver> for Reply {
    fn from(take_over: TakeOver) -> Self {
        Self::TakeOver(take_over)
    }
}
