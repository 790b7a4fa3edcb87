// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static service metadata — the declarative catalog the Supervisor is built from.

use crate::id::ServiceId;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// An argv + environment-additions pair produced by a service's install or
/// start recipe.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Recipe {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { argv: argv.into_iter().map(Into::into).collect(), env: Vec::new() }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Inputs available to a recipe function when it is evaluated: the runtime
/// (e.g. a resolved interpreter path) a service was told to use, and the
/// directory conventions the caller has already worked out.
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    /// Resolved interpreter/runtime path, when `find_runtime` has been run.
    pub runtime_path: Option<PathBuf>,
    /// Whether GPU capability was probed and found present.
    pub gpu_available: bool,
}

/// A function producing a [`Recipe`] given the current [`RuntimeContext`].
///
/// Modeled as a boxed closure (rather than a bare `fn`) so a registry built
/// at runtime can close over per-service directories and venv paths, the
/// way `launcher/manager.py`'s `services` dict binds `start_cmd` to a bound
/// method closing over `self`.
pub type RecipeFn = Arc<dyn Fn(&RuntimeContext) -> Recipe + Send + Sync>;

/// Marks a service as started by another service (e.g. the gateway spawning
/// its own LLM subprocess); it is observed but never started/stopped
/// directly by the supervisor. `peer` names the manager.
#[derive(Debug, Clone)]
pub struct ManagedByPeer {
    pub peer: ServiceId,
}

/// How the Installer Runner decides whether a service's environment is
/// ready, independent of whether this supervisor itself ran the install
/// (spec §4.3 "Install-status check").
#[derive(Debug, Clone)]
pub enum InstallCheck {
    /// Script/interpreted service: the per-service venv directory must exist
    /// and its interpreter must launch. When `representative_packages` is
    /// non-empty (the shared-runtime/"core" case) the interpreter must also
    /// `import` each of them cleanly.
    Interpreted { venv_dir: PathBuf, representative_packages: Vec<String> },
    /// Compiled-asset service (e.g. a frontend build): the built-artifact
    /// directory must exist.
    CompiledAsset { artifact_dir: PathBuf },
}

/// Static, declarative description of one supervised service.
#[derive(Clone)]
pub struct Service {
    pub id: ServiceId,
    pub display_name: String,
    pub port: u16,
    pub base_url: String,
    /// `None` means readiness is "TCP connect succeeds".
    pub health_path: Option<String>,
    pub working_dir: PathBuf,
    pub is_core: bool,
    pub install_recipe: RecipeFn,
    /// `None` for services that are `managed_by_peer` (they have no start
    /// command of their own).
    pub start_recipe: Option<RecipeFn>,
    pub managed_by_peer: Option<ManagedByPeer>,
    pub install_check: InstallCheck,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("health_path", &self.health_path)
            .field("working_dir", &self.working_dir)
            .field("is_core", &self.is_core)
            .field("managed_by_peer", &self.managed_by_peer.as_ref().map(|m| &m.peer))
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn health_url(&self) -> Option<String> {
        self.health_path.as_ref().map(|path| format!("{}{}", self.base_url, path))
    }
}

/// Validate the registry invariants from spec §3: ports are unique across
/// services, every declared manager reference resolves to a real service
/// (so "exactly one service may declare itself the manager of another" is
/// meaningful rather than dangling), and `managed-by-peer` services carry
/// no start recipe of their own.
pub fn validate_services(services: &[Service]) -> Result<(), String> {
    use std::collections::{HashMap, HashSet};

    let mut ports: HashMap<u16, &ServiceId> = HashMap::new();
    for svc in services {
        if let Some(existing) = ports.insert(svc.port, &svc.id) {
            return Err(format!(
                "port {} is declared by both {} and {}",
                svc.port, existing, svc.id
            ));
        }
    }

    let known: HashSet<&ServiceId> = services.iter().map(|s| &s.id).collect();
    for svc in services {
        if let Some(mbp) = &svc.managed_by_peer {
            if !known.contains(&mbp.peer) {
                return Err(format!(
                    "{} is managed-by-peer of unknown service {}",
                    svc.id, mbp.peer
                ));
            }
            if mbp.peer == svc.id {
                return Err(format!("{} cannot be managed by itself", svc.id));
            }
            if svc.start_recipe.is_some() {
                return Err(format!(
                    "{} is managed-by-peer but also declares a start recipe",
                    svc.id
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(id: &str, port: u16) -> Service {
        Service {
            id: ServiceId::new(id),
            display_name: id.to_string(),
            port,
            base_url: format!("http://localhost:{port}"),
            health_path: Some("/health".to_string()),
            working_dir: PathBuf::from("/tmp"),
            is_core: false,
            install_recipe: Arc::new(|_| Recipe::default()),
            start_recipe: Some(Arc::new(|_| Recipe::default())),
            managed_by_peer: None,
            install_check: InstallCheck::Interpreted {
                venv_dir: PathBuf::from("/tmp/venv"),
                representative_packages: Vec::new(),
            },
        }
    }

    #[test]
    fn rejects_duplicate_ports() {
        let a = svc("a", 8000);
        let b = svc("b", 8000);
        assert!(validate_services(&[a, b]).is_err());
    }

    #[test]
    fn rejects_manager_reference_to_unknown_service() {
        let mut llm = svc("llm", 8001);
        llm.managed_by_peer = Some(ManagedByPeer { peer: ServiceId::new("nonexistent") });
        llm.start_recipe = None;
        assert!(validate_services(&[llm]).is_err());
    }

    #[test]
    fn rejects_self_management() {
        let mut llm = svc("llm", 8001);
        llm.managed_by_peer = Some(ManagedByPeer { peer: ServiceId::new("llm") });
        llm.start_recipe = None;
        assert!(validate_services(&[llm]).is_err());
    }

    #[test]
    fn rejects_managed_by_peer_with_start_recipe() {
        let mut gateway = svc("gateway", 8000);
        let mut llm = svc("llm", 8001);
        llm.managed_by_peer = Some(ManagedByPeer { peer: ServiceId::new("gateway") });
        gateway.is_core = true;
        // llm still has its default start_recipe set — invalid combination.
        assert!(validate_services(&[gateway, llm]).is_err());
    }

    #[test]
    fn accepts_a_valid_registry() {
        let mut gateway = svc("gateway", 8000);
        let mut llm = svc("llm", 8001);
        llm.managed_by_peer = Some(ManagedByPeer { peer: ServiceId::new("gateway") });
        llm.start_recipe = None;
        gateway.is_core = true;
        assert!(validate_services(&[gateway, llm]).is_ok());
    }
}
