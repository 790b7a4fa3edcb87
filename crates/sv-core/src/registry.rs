// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Service Registry: a static, declarative catalog of supervised
//! services (spec §3), plus the concrete built-in catalog grounded in the
//! original launcher's `services` dict.

use crate::id::ServiceId;
use crate::service::{InstallCheck, ManagedByPeer, Recipe, Service, validate_services};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns the validated set of declared services, indexed by id.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    by_id: HashMap<ServiceId, Service>,
    order: Vec<ServiceId>,
}

impl ServiceRegistry {
    /// Validates invariants (unique ports, resolvable manager references, no
    /// start recipe on managed-by-peer services) before accepting the set.
    pub fn new(services: Vec<Service>) -> Result<Self, String> {
        validate_services(&services)?;
        let order = services.iter().map(|s| s.id.clone()).collect();
        let by_id = services.into_iter().map(|s| (s.id.clone(), s)).collect();
        Ok(Self { by_id, order })
    }

    pub fn get(&self, id: &str) -> Option<&Service> {
        self.by_id.get(id)
    }

    /// Declaration order, stable for display and for fan-out iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.order.iter().filter_map(|id| self.by_id.get(id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn core_services(&self) -> impl Iterator<Item = &Service> {
        self.iter().filter(|s| s.is_core)
    }

    pub fn directly_startable(&self) -> impl Iterator<Item = &Service> {
        self.iter().filter(|s| s.managed_by_peer.is_none())
    }
}

fn py_recipe(working_dir: &PathBuf, module: &'static str) -> Arc<dyn Fn(&crate::service::RuntimeContext) -> Recipe + Send + Sync> {
    let _ = working_dir;
    Arc::new(move |ctx| {
        let python = ctx
            .runtime_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "python3".to_string());
        Recipe::new([python, "-m".to_string(), module.to_string()])
    })
}

fn pip_install_recipe(requirements: &'static str) -> Arc<dyn Fn(&crate::service::RuntimeContext) -> Recipe + Send + Sync> {
    Arc::new(move |ctx| {
        let python = ctx
            .runtime_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "python3".to_string());
        Recipe::new([python, "-m".to_string(), "pip".to_string(), "install".to_string(), "-r".to_string(), requirements.to_string()])
    })
}

/// The nine-service catalog the original desktop launcher ships with:
/// four "core" services sharing one venv (memory, tools, gateway, llm — llm
/// is started by the gateway, not the supervisor), and five standalone
/// leaf services (whisper, piper, chatterbox, kokoro, frontend).
pub fn builtin(root_dir: PathBuf) -> Vec<Service> {
    let services_dir = root_dir.join("services");
    // The four core services share one venv (`launcher/manager.py`'s
    // `core_venv`), so installing any of them must resolve the same two
    // packages the gateway's FastAPI app needs at import time.
    let core_venv = services_dir.join(".core_venv");
    let core_packages = || vec!["fastapi".to_string(), "uvicorn".to_string()];

    let svc = |id: &str, display_name: &str, port: u16, health_path: Option<&str>, dir: &str, module: &'static str, is_core: bool| {
        let working_dir = services_dir.join(dir);
        let install_check = if is_core {
            InstallCheck::Interpreted { venv_dir: core_venv.clone(), representative_packages: core_packages() }
        } else {
            InstallCheck::Interpreted { venv_dir: working_dir.join(".venv"), representative_packages: Vec::new() }
        };
        Service {
            id: ServiceId::new(id),
            display_name: display_name.to_string(),
            port,
            base_url: format!("http://localhost:{port}"),
            health_path: health_path.map(|p| p.to_string()),
            working_dir: working_dir.clone(),
            is_core,
            install_recipe: pip_install_recipe("requirements.txt"),
            start_recipe: Some(py_recipe(&working_dir, module)),
            managed_by_peer: None,
            install_check,
        }
    };

    let memory = svc("memory", "Memory", 8005, Some("/health"), "memory", "memory.main", true);
    let tools = svc("tools", "Tools", 8006, Some("/health"), "tools", "tools.main", true);
    let gateway = svc("gateway", "Gateway", 8000, Some("/health"), "gateway", "gateway.main", true);

    let mut llm = svc("llm", "LLM", 8001, Some("/health"), "llm", "llm.main", true);
    llm.start_recipe = None;
    llm.managed_by_peer = Some(ManagedByPeer { peer: ServiceId::new("gateway") });

    let whisper = svc("whisper", "Whisper (STT)", 8003, Some("/health"), "whisper", "whisper.main", false);
    let piper = svc("piper", "Piper (TTS)", 8004, Some("/health"), "piper", "piper.main", false);

    let mut chatterbox = svc("chatterbox", "Chatterbox (TTS)", 4123, Some("/health"), "chatterbox", "chatterbox.main", false);
    chatterbox.working_dir = root_dir.join("external").join("chatterbox");
    chatterbox.install_check = InstallCheck::Interpreted {
        venv_dir: chatterbox.working_dir.join(".venv"),
        representative_packages: Vec::new(),
    };

    let kokoro = svc("kokoro", "Kokoro (TTS)", 8880, Some("/health"), "kokoro", "kokoro.main", false);

    // The frontend has no health endpoint; readiness is "TCP connect succeeds".
    let mut frontend = svc("frontend", "Frontend", 8002, None, "frontend", "frontend.main", false);
    frontend.install_check =
        InstallCheck::CompiledAsset { artifact_dir: frontend.working_dir.join("node_modules") };

    vec![memory, tools, gateway, llm, whisper, piper, chatterbox, kokoro, frontend]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_validates() {
        let services = builtin(PathBuf::from("/opt/assistant"));
        assert_eq!(services.len(), 9);
        let registry = ServiceRegistry::new(services).expect("builtin catalog must be valid");
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn llm_is_managed_by_gateway_and_unstartable_directly() {
        let services = builtin(PathBuf::from("/opt/assistant"));
        let registry = ServiceRegistry::new(services).unwrap();
        let llm = registry.get("llm").unwrap();
        assert!(llm.start_recipe.is_none());
        assert_eq!(llm.managed_by_peer.as_ref().unwrap().peer, ServiceId::new("gateway"));
        assert!(!registry.directly_startable().any(|s| s.id == ServiceId::new("llm")));
    }

    #[test]
    fn frontend_has_no_health_path() {
        let services = builtin(PathBuf::from("/opt/assistant"));
        let registry = ServiceRegistry::new(services).unwrap();
        assert!(registry.get("frontend").unwrap().health_url().is_none());
    }

    #[test]
    fn four_core_services_share_the_core_flag() {
        let services = builtin(PathBuf::from("/opt/assistant"));
        let registry = ServiceRegistry::new(services).unwrap();
        assert_eq!(registry.core_services().count(), 4);
    }
}
