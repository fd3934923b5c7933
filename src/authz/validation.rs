//! Structural checks on a policy and on role assignments.

use std::collections::HashSet;

use crate::authz::errors::{AuthzError, PolicyError};
use crate::authz::types::Permission;
use crate::authz::Policy;

/// Reject a role name before it is persisted on a user record.
pub fn validate_role_assignment(policy: &Policy, role: &str) -> Result<(), AuthzError> {
    if role.is_empty() {
        return Err(AuthzError::MalformedRequest("role name is empty".into()));
    }
    if !policy.role_exists(role) {
        return Err(AuthzError::RoleNotFound(role.to_string()));
    }
    Ok(())
}

/// Every preset reference resolves, every parent exists, and the parent
/// graph is acyclic.
pub fn validate_policy(policy: &Policy) -> Result<(), PolicyError> {
    for role in policy.roles() {
        for permission in role.permissions.values().flatten() {
            if let Permission::Preset(name) = permission {
                if policy.preset(name).is_none() {
                    return Err(PolicyError::UndefinedPreset(format!(
                        "{name} (referenced by role `{}`)",
                        role.name
                    )));
                }
            }
        }
        for parent in &role.parents {
            if !policy.role_exists(parent) {
                return Err(PolicyError::UndefinedRole(format!(
                    "{parent} (parent of role `{}`)",
                    role.name
                )));
            }
        }
    }
    check_role_cycles(policy)
}

/// Check for cycles in role inheritance using DFS.
fn check_role_cycles(policy: &Policy) -> Result<(), PolicyError> {
    let mut visited = HashSet::new();
    let mut names: Vec<&str> = policy.roles().map(|r| r.name.as_str()).collect();
    names.sort_unstable();

    for name in names {
        if !visited.contains(name) {
            let mut path = Vec::new();
            dfs_cycle_check(name, policy, &mut visited, &mut path)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check<'p>(
    name: &'p str,
    policy: &'p Policy,
    visited: &mut HashSet<&'p str>,
    path: &mut Vec<&'p str>,
) -> Result<(), PolicyError> {
    visited.insert(name);
    path.push(name);

    if let Some(role) = policy.role(name) {
        for parent in &role.parents {
            if let Some(start) = path.iter().position(|p| p == parent) {
                let mut cycle = path[start..].join(" -> ");
                cycle.push_str(" -> ");
                cycle.push_str(parent);
                return Err(PolicyError::CyclicRoleInheritance(cycle));
            }
            if !visited.contains(parent.as_str()) {
                dfs_cycle_check(parent, policy, visited, path)?;
            }
        }
    }

    path.pop();
    Ok(())
}
