use std::path::Path;

use crate::authz::condition::PredicateRegistry;
use crate::authz::errors::PolicyError;
use crate::authz::policy::{parse_kdl_document, ParsedPolicy};
use crate::authz::validation::validate_policy;
use crate::authz::Policy;

/// Load all `.kdl` policy files from the given directory and compile them
/// into a single validated `Policy`.
pub fn load_policies(dir: &Path, registry: &PredicateRegistry) -> Result<Policy, PolicyError> {
    if !dir.is_dir() {
        return Err(PolicyError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "kdl").unwrap_or(false))
        .collect();
    entries.sort();

    let mut all_parsed = Vec::with_capacity(entries.len());
    for path in &entries {
        let contents =
            std::fs::read_to_string(path).map_err(|source| PolicyError::PolicyLoad {
                path: path.display().to_string(),
                source,
            })?;
        let parsed =
            parse_kdl_document(&contents, registry).map_err(|e| in_file(e, path))?;
        tracing::debug!(
            path = %path.display(),
            presets = parsed.presets.len(),
            roles = parsed.roles.len(),
            "Parsed policy file"
        );
        all_parsed.push(parsed);
    }

    let policy = compile_policies(all_parsed)?;

    tracing::info!(
        files = entries.len(),
        presets = policy.preset_count(),
        roles = policy.role_count(),
        "Loaded authorization policies"
    );

    Ok(policy)
}

/// Prefix parse errors with the file they came from.
fn in_file(err: PolicyError, path: &Path) -> PolicyError {
    let at = |msg: String| format!("{}: {msg}", path.display());
    match err {
        PolicyError::KdlParse(msg) => PolicyError::KdlParse(at(msg)),
        PolicyError::InvalidPolicy(msg) => PolicyError::InvalidPolicy(at(msg)),
        PolicyError::InvalidCondition(msg) => PolicyError::InvalidCondition(at(msg)),
        PolicyError::UnknownPredicate(name) => PolicyError::UnknownPredicate(at(name)),
        other => other,
    }
}

/// Merge parsed files in order and validate the result. A later definition
/// of a preset or role replaces an earlier one with the same name.
pub fn compile_policies(parsed: Vec<ParsedPolicy>) -> Result<Policy, PolicyError> {
    let mut builder = Policy::builder();
    for p in parsed {
        for (name, grant) in p.presets {
            builder = builder.preset(name, grant);
        }
        for role in p.roles {
            builder = builder.role(role);
        }
    }

    let policy = builder.build();
    validate_policy(&policy)?;
    Ok(policy)
}
