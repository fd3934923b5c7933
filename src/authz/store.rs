use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::authz::condition::PredicateRegistry;
use crate::authz::engine::Authorizer;
use crate::authz::errors::PolicyError;
use crate::authz::loader::load_policies;
use crate::authz::Policy;

/// Holds the active policy snapshot. Readers never block; a reload swaps in
/// a fully validated replacement while in-flight evaluations keep the
/// snapshot they started with.
pub struct PolicyStore {
    current: ArcSwap<Policy>,
}

impl PolicyStore {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
        }
    }

    pub fn snapshot(&self) -> Arc<Policy> {
        self.current.load_full()
    }

    pub fn replace(&self, policy: Policy) {
        self.current.store(Arc::new(policy));
    }

    /// Evaluator bound to the current snapshot.
    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.snapshot())
    }

    /// On error the previous snapshot stays active.
    pub fn reload(&self, dir: &Path, registry: &PredicateRegistry) -> Result<(), PolicyError> {
        match load_policies(dir, registry) {
            Ok(policy) => {
                tracing::info!(
                    roles = policy.role_count(),
                    presets = policy.preset_count(),
                    "Installed reloaded authorization policy"
                );
                self.replace(policy);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Policy reload failed, keeping previous snapshot");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("PolicyStore")
            .field("roles", &snapshot.role_count())
            .field("presets", &snapshot.preset_count())
            .finish()
    }
}
