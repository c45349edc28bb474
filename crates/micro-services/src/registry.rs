//! The call registry and the directory walk that builds it.
//!
//! Layout: `servicesRoot/{service}/{logic}.{ext}`. Every service directory
//! and logic file whose name parses as a non-private identifier is asked of
//! the [`ModuleCatalog`]; every non-private export of the loaded module
//! becomes a [`RegistryEntry`].
//!
//! A failure anywhere in a subtree (unreadable directory, no registered
//! module, loader error) is logged and that subtree contributes nothing.
//! Siblings still load.
//!
//! Entries are listed in byte order of their file names, so when two
//! declared names collapse onto the same base name (`$auth` and `auth`,
//! `user.js` and `user.ts`) the later one deterministically wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use micro_protocol::{CallPayload, DeclaredName, Visibility};
use tracing::{debug, info, warn};

use crate::catalog::{ModuleCatalog, RegistryError};
use crate::{Handler, HandlerFuture};

/// One invocable function and the visibility of each of its three levels.
pub struct RegistryEntry {
    pub service: DeclaredName,
    pub logic: DeclaredName,
    pub function: DeclaredName,
    handler: Handler,
}

impl RegistryEntry {
    /// Visibilities in service, logic, function order.
    pub fn visibilities(&self) -> [Visibility; 3] {
        [
            self.service.visibility(),
            self.logic.visibility(),
            self.function.visibility(),
        ]
    }

    /// Any level is tagged restricted.
    pub fn is_restricted(&self) -> bool {
        self.visibilities().contains(&Visibility::Restricted)
    }

    /// `service/logic/function` with modifiers stripped.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.service.name(),
            self.logic.name(),
            self.function.name()
        )
    }

    pub fn invoke(&self, payload: CallPayload) -> HandlerFuture {
        (self.handler)(payload)
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("service", &self.service)
            .field("logic", &self.logic)
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

type FunctionMap = HashMap<String, RegistryEntry>;
type LogicMap = HashMap<String, FunctionMap>;

/// Immutable lookup table keyed by base names.
#[derive(Debug, Default)]
pub struct Registry {
    services: HashMap<String, LogicMap>,
    len: usize,
}

impl Registry {
    /// Exact-match lookup by base names.
    pub fn get(&self, service: &str, logic: &str, function: &str) -> Option<&RegistryEntry> {
        self.services.get(service)?.get(logic)?.get(function)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All callable paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .services
            .values()
            .flat_map(|logics| logics.values())
            .flat_map(|functions| functions.values())
            .map(RegistryEntry::path)
            .collect();
        paths.sort();
        paths
    }

    fn insert(&mut self, entry: RegistryEntry) -> Option<RegistryEntry> {
        let previous = self
            .services
            .entry(entry.service.name().to_string())
            .or_default()
            .entry(entry.logic.name().to_string())
            .or_default()
            .insert(entry.function.name().to_string(), entry);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }
}

/// Walks a services directory against a catalog. Runs once at startup.
pub struct RegistryBuilder<'a> {
    catalog: &'a ModuleCatalog,
}

impl<'a> RegistryBuilder<'a> {
    pub fn new(catalog: &'a ModuleCatalog) -> Self {
        Self { catalog }
    }

    /// Build the registry. Never fails: problems are logged per subtree.
    pub fn build(&self, services_root: &Path) -> Registry {
        let mut registry = Registry::default();

        let services = match sorted_entries(services_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Services directory unavailable, registry is empty: {e}");
                return registry;
            }
        };

        for (dir_name, path) in services {
            if !path.is_dir() {
                continue;
            }
            let Some(service) = DeclaredName::parse(&dir_name) else {
                debug!("Skipping service directory with invalid name: {dir_name}");
                continue;
            };
            if service.is_private() {
                debug!("Skipping private service: {dir_name}");
                continue;
            }
            if let Err(e) = self.load_service(&mut registry, &service, &dir_name, &path) {
                warn!("Skipping service {dir_name}: {e}");
            }
        }

        info!("Registry built: {} functions", registry.len());
        registry
    }

    fn load_service(
        &self,
        registry: &mut Registry,
        service: &DeclaredName,
        dir_name: &str,
        path: &Path,
    ) -> Result<(), RegistryError> {
        for (file_name, file_path) in sorted_entries(path)? {
            if !file_path.is_file() {
                continue;
            }
            let stem = file_stem(&file_name);
            let Some(logic) = DeclaredName::parse(stem) else {
                debug!("Skipping logic file with invalid name: {dir_name}/{file_name}");
                continue;
            };
            if logic.is_private() {
                debug!("Skipping private logic: {dir_name}/{file_name}");
                continue;
            }
            if let Err(e) = self.load_logic(registry, service, &logic, dir_name, stem) {
                warn!("Skipping logic {dir_name}/{file_name}: {e}");
            }
        }
        Ok(())
    }

    fn load_logic(
        &self,
        registry: &mut Registry,
        service: &DeclaredName,
        logic: &DeclaredName,
        dir_name: &str,
        stem: &str,
    ) -> Result<(), RegistryError> {
        let module = self.catalog.load(dir_name, stem)?;

        for (export_name, handler) in module.into_exports() {
            let Some(function) = DeclaredName::parse(&export_name) else {
                debug!("Skipping export with invalid name: {dir_name}/{stem}.{export_name}");
                continue;
            };
            if function.is_private() {
                continue;
            }

            let entry = RegistryEntry {
                service: service.clone(),
                logic: logic.clone(),
                function,
                handler,
            };
            let path = entry.path();
            match registry.insert(entry) {
                Some(previous) => warn!(
                    "Replaced {path} (was {}/{}/{})",
                    previous.service, previous.logic, previous.function
                ),
                None => info!("Loaded {path}"),
            }
        }
        Ok(())
    }
}

/// Immediate children of `dir` as `(file name, path)`, sorted by name.
/// Non-UTF-8 names are dropped.
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if let Ok(name) = entry.file_name().into_string() {
            entries.push((name, entry.path()));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// File name without its last extension. Dotfiles keep their full name so
/// they fail identifier parsing.
fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(idx) => &file_name[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_last_extension() {
        assert_eq!(file_stem("user.js"), "user");
        assert_eq!(file_stem("user.test.js"), "user.test");
        assert_eq!(file_stem("user"), "user");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }
}
