use kdl::{KdlDocument, KdlNode};

use crate::authz::condition::{Condition, PredicateRegistry};
use crate::authz::errors::PolicyError;
use crate::authz::types::{Grant, Permission, Role};

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub presets: Vec<(String, Grant)>,
    pub roles: Vec<Role>,
}

/// Parse a KDL document string into presets and roles. Condition names are
/// resolved against `registry`, expressions are compiled here.
pub fn parse_kdl_document(
    source: &str,
    registry: &PredicateRegistry,
) -> Result<ParsedPolicy, PolicyError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| PolicyError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "preset" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    PolicyError::InvalidPolicy(
                        "preset node requires a string argument (e.g. preset \"view_own\" action=\"view\")".into(),
                    )
                })?;
                let action = string_prop(node, "action").ok_or_else(|| {
                    PolicyError::InvalidPolicy(format!(
                        "preset `{name}` missing `action` property (e.g. action=\"view\")"
                    ))
                })?;
                let conditions = parse_conditions(node, registry, &format!("preset `{name}`"))?;
                policy.presets.push((
                    name,
                    Grant {
                        action,
                        conditions,
                    },
                ));
            }
            "role" => policy.roles.push(parse_role(node, registry)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_role(node: &KdlNode, registry: &PredicateRegistry) -> Result<Role, PolicyError> {
    let name = first_string_arg(node).ok_or_else(|| {
        PolicyError::InvalidPolicy(
            "role node requires a string argument (e.g. role \"developer\")".into(),
        )
    })?;

    let mut role = Role::new(name.clone());
    if let Some(display) = string_prop(node, "display") {
        role = role.display_name(display);
    }
    if let Some(color) = string_prop(node, "color") {
        role = role.color(color);
    }

    let Some(children) = node.children() else {
        return Ok(role);
    };

    for child in children.nodes() {
        match child.name().value() {
            "parents" => {
                role.parents = dash_list(child);
            }
            "resource" => {
                let kind = first_string_arg(child).ok_or_else(|| {
                    PolicyError::InvalidPolicy(format!(
                        "resource node in role `{name}` requires a kind argument (e.g. resource \"user\")"
                    ))
                })?;
                let Some(permissions) = child.children() else {
                    continue;
                };
                for perm in permissions.nodes() {
                    if perm.name().value() != "permission" {
                        return Err(PolicyError::InvalidPolicy(format!(
                            "unexpected child `{}` in resource `{kind}` of role `{name}` (expected `permission`)",
                            perm.name().value()
                        )));
                    }
                    let permission = parse_permission(perm, registry, &name, &kind)?;
                    role = role.permit(kind.clone(), permission);
                }
            }
            other => {
                return Err(PolicyError::InvalidPolicy(format!(
                    "unexpected child `{other}` in role `{name}` (expected `parents` or `resource`)"
                )));
            }
        }
    }

    Ok(role)
}

fn parse_permission(
    node: &KdlNode,
    registry: &PredicateRegistry,
    role: &str,
    kind: &str,
) -> Result<Permission, PolicyError> {
    let action = first_string_arg(node);
    match (string_prop(node, "preset"), action) {
        (Some(preset), None) => {
            if node.children().is_some() {
                return Err(PolicyError::InvalidPolicy(format!(
                    "permission preset=\"{preset}\" in role `{role}` cannot declare its own conditions"
                )));
            }
            Ok(Permission::Preset(preset))
        }
        (Some(preset), Some(action)) => Err(PolicyError::InvalidPolicy(format!(
            "permission `{action}` in role `{role}` cannot also reference preset `{preset}`"
        ))),
        (None, Some(action)) => {
            let context = format!("permission `{action}` of `{kind}` in role `{role}`");
            Ok(Permission::Inline(Grant {
                conditions: parse_conditions(node, registry, &context)?,
                action,
            }))
        }
        (None, None) => Err(PolicyError::InvalidPolicy(format!(
            "permission in `{kind}` of role `{role}` needs an action argument or a preset property"
        ))),
    }
}

/// `condition "owner"`, `condition expr="..."`, optionally `reject="not-found"`.
fn parse_conditions(
    node: &KdlNode,
    registry: &PredicateRegistry,
    context: &str,
) -> Result<Vec<Condition>, PolicyError> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };

    children
        .nodes()
        .iter()
        .map(|child| {
            if child.name().value() != "condition" {
                return Err(PolicyError::InvalidPolicy(format!(
                    "unexpected child `{}` in {context} (expected `condition`)",
                    child.name().value()
                )));
            }
            let condition = match (first_string_arg(child), string_prop(child, "expr")) {
                (Some(name), None) => registry.lookup(&name)?,
                (None, Some(expr)) => Condition::expression(&expr)?,
                _ => {
                    return Err(PolicyError::InvalidPolicy(format!(
                        "condition in {context} needs exactly one of a predicate name or expr=\"...\""
                    )))
                }
            };
            match string_prop(child, "reject").as_deref() {
                None | Some("forbidden") => Ok(condition),
                Some("not-found") => Ok(condition.concealed()),
                Some(other) => Err(PolicyError::InvalidPolicy(format!(
                    "unknown reject mode `{other}` in {context} (expected `forbidden` or `not-found`)"
                ))),
            }
        })
        .collect()
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn string_prop(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// parents {
///     - "default"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
