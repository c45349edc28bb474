//! micro service modules and the call registry.
//!
//! A *logic module* is a bag of named functions (its exports). Modules are
//! registered in a [`ModuleCatalog`] under the on-disk location they stand
//! for, and the [`RegistryBuilder`] walks a services directory to decide
//! which of them become callable as `service/logic/function`.

pub mod catalog;
pub mod compose;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use micro_protocol::{CallError, CallPayload, CallResult, Reply};

pub use catalog::{ModuleCatalog, RegistryError};
pub use compose::{compose, pipe, with_args};
pub use registry::{Registry, RegistryBuilder, RegistryEntry};

/// Future returned by a registered function.
pub type HandlerFuture = Pin<Box<dyn Future<Output = CallResult> + Send>>;

/// A registered function. Owned by exactly one registry entry.
pub type Handler = Box<dyn Fn(CallPayload) -> HandlerFuture + Send + Sync>;

/// Box an async function into a [`Handler`].
///
/// The function may return anything convertible into a [`Reply`], so plain
/// `serde_json::Value` results and `Reply::TakeOver` both work.
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(CallPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CallError>> + Send + 'static,
    R: Into<Reply>,
{
    Box::new(move |payload| {
        let fut = f(payload);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}

/// The exports of one logic file.
#[derive(Default)]
pub struct LogicModule {
    exports: Vec<(String, Handler)>,
}

impl LogicModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an export. Names keep their modifier (`_helper`, `$purge`); the
    /// registry decides visibility when the module is loaded.
    pub fn export<F, Fut, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CallError>> + Send + 'static,
        R: Into<Reply>,
    {
        self.exports.push((name.into(), handler(f)));
        self
    }

    /// Add an already boxed handler.
    pub fn export_handler(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.exports.push((name.into(), handler));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    pub(crate) fn into_exports(self) -> Vec<(String, Handler)> {
        self.exports
    }
}

impl std::fmt::Debug for LogicModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicModule")
            .field("exports", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
