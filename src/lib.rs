//! micro: convention-based service registry served over HTTP and WebSocket.
//!
//! The binary wires configuration, the registry, the call router and the
//! transport together. The modules of the bundled demo project live under
//! `demo/services/{service}/{logic}.rs`, one file per logic module, and are
//! registered in [`demo_catalog`] under the same locations.

use std::path::PathBuf;

use micro_services::ModuleCatalog;

#[path = "../demo/services/auth/user.rs"]
pub mod auth_user;

#[path = "../demo/services/$admin/stats.rs"]
pub mod admin_stats;

#[path = "../demo/services/events/feed.rs"]
pub mod events_feed;

/// Catalog of every logic module compiled into the binary.
pub fn demo_catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .with("auth/user", auth_user::module)
        .with("$admin/stats", admin_stats::module)
        .with("events/feed", events_feed::module)
}

/// The demo project shipped with the crate.
pub fn demo_project_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_services::RegistryBuilder;

    #[test]
    fn demo_catalog_covers_demo_services() {
        let catalog = demo_catalog();
        for location in ["auth/user", "$admin/stats", "events/feed"] {
            assert!(catalog.contains(location), "{location}");
        }

        let registry = RegistryBuilder::new(&catalog).build(&demo_project_dir().join("services"));
        assert_eq!(
            registry.paths(),
            vec![
                "admin/stats/count",
                "auth/user/list",
                "auth/user/profile",
                "events/feed/watch",
            ]
        );
    }
}
