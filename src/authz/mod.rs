pub mod builtin;
pub mod condition;
pub mod engine;
pub mod errors;
pub mod expr;
pub mod loader;
pub mod policy;
pub mod resource;
pub mod store;
pub mod types;
pub mod validation;
pub mod web;

use std::collections::HashMap;

pub use condition::{Condition, Predicate, PredicateRegistry};
pub use engine::Authorizer;
pub use errors::{AuthzError, PolicyError};
pub use resource::{Resource, ResourceRecord, Shared};
pub use store::PolicyStore;
pub use types::{Actor, AuthzRequest, Grant, Permission, RequestContext, Role};

/// Roles and presets, immutable after construction.
/// Configuration changes install a new `Policy` through [`PolicyStore`].
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// role name -> Role
    roles: HashMap<String, Role>,
    /// preset name -> shared grant
    presets: HashMap<String, Grant>,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn preset(&self, name: &str) -> Option<&Grant> {
        self.presets.get(name)
    }

    pub fn role_exists(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn presets(&self) -> impl Iterator<Item = (&str, &Grant)> {
        self.presets.iter().map(|(name, grant)| (name.as_str(), grant))
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn preset_count(&self) -> usize {
        self.presets.len()
    }

    /// Expand a permission entry of `role` into the grant it stands for.
    pub fn resolve<'a>(
        &'a self,
        role: &str,
        permission: &'a Permission,
    ) -> Result<&'a Grant, AuthzError> {
        match permission {
            Permission::Inline(grant) => Ok(grant),
            Permission::Preset(name) => {
                self.presets
                    .get(name)
                    .ok_or_else(|| AuthzError::PresetNotFound {
                        preset: name.clone(),
                        role: role.to_string(),
                    })
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct PolicyBuilder {
    roles: HashMap<String, Role>,
    presets: HashMap<String, Grant>,
}

impl PolicyBuilder {
    /// Later definitions with the same name replace earlier ones.
    pub fn preset(mut self, name: impl Into<String>, grant: Grant) -> Self {
        self.presets.insert(name.into(), grant);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.insert(role.name.clone(), role);
        self
    }

    pub fn build(self) -> Policy {
        Policy {
            roles: self.roles,
            presets: self.presets,
        }
    }
}
