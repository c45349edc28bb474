//! micro server: routes calls from every transport into the registry.
//!
//! The [`CallRouter`] owns the shared registry and the middleware chain and
//! implements the transport layer's `CallHandler`. [`config`] loads the
//! layered project configuration the binary wires it with.

pub mod config;
pub mod middleware;
pub mod router;

pub use config::{ConfigError, ConfigLoader, ServerConfig};
pub use middleware::{
    CallLogger, CallMiddleware, MiddlewareChain, MiddlewareResult, OriginGuard, OriginRule,
};
pub use router::CallRouter;
