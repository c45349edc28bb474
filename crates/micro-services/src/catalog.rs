//! Module catalog: the explicit registration table that stands in for
//! loading code by file path.
//!
//! Each entry is keyed by the on-disk location it implements,
//! `"{serviceDir}/{logicStem}"`, modifiers included (`"$admin/stats"`).

use std::collections::HashMap;

use crate::LogicModule;

/// Errors raised while building the registry. Always logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no module registered for {0}")]
    NotRegistered(String),

    #[error("failed to load {location}: {reason}")]
    LoadFailed { location: String, reason: String },
}

impl RegistryError {
    /// Convenience for loaders that reject their own module.
    pub fn load_failed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

type ModuleLoader = Box<dyn Fn() -> Result<LogicModule, RegistryError> + Send + Sync>;

/// Registration table of every logic module the process knows about.
#[derive(Default)]
pub struct ModuleCatalog {
    loaders: HashMap<String, ModuleLoader>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for `location`. A later registration for the same
    /// location replaces the earlier one.
    pub fn register<F>(&mut self, location: impl Into<String>, loader: F)
    where
        F: Fn() -> Result<LogicModule, RegistryError> + Send + Sync + 'static,
    {
        self.loaders.insert(location.into(), Box::new(loader));
    }

    /// Builder-style [`register`](Self::register) for infallible loaders.
    pub fn with<F>(mut self, location: impl Into<String>, module: F) -> Self
    where
        F: Fn() -> LogicModule + Send + Sync + 'static,
    {
        self.register(location, move || Ok(module()));
        self
    }

    /// Load the module behind `service_dir/logic_stem`.
    pub fn load(&self, service_dir: &str, logic_stem: &str) -> Result<LogicModule, RegistryError> {
        let location = format!("{service_dir}/{logic_stem}");
        match self.loaders.get(&location) {
            Some(loader) => loader(),
            None => Err(RegistryError::NotRegistered(location)),
        }
    }

    pub fn contains(&self, location: &str) -> bool {
        self.loaders.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut locations: Vec<_> = self.loaders.keys().collect();
        locations.sort();
        f.debug_struct("ModuleCatalog")
            .field("locations", &locations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_registered_module() {
        let catalog = ModuleCatalog::new().with("auth/user", || {
            LogicModule::new().export("list", |_p| async { Ok(json!([])) })
        });
        let module = catalog.load("auth", "user").unwrap();
        assert_eq!(module.names().collect::<Vec<_>>(), vec!["list"]);
        assert!(catalog.contains("auth/user"));
    }

    #[test]
    fn load_unknown_location() {
        let catalog = ModuleCatalog::new();
        let err = catalog.load("auth", "user").unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered(ref loc) if loc == "auth/user"));
    }

    #[test]
    fn loader_error_propagates() {
        let mut catalog = ModuleCatalog::new();
        catalog.register("auth/broken", || Err(RegistryError::load_failed("auth/broken", "syntax error")));
        assert!(matches!(
            catalog.load("auth", "broken"),
            Err(RegistryError::LoadFailed { .. })
        ));
    }
}
