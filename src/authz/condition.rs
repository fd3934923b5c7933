//! Condition predicates attached to permissions.
//!
//! A permission's condition list is an AND. OR semantics live inside a
//! single composite predicate such as [`Condition::OwnerOrShared`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::authz::errors::{AuthzError, PolicyError};
use crate::authz::expr::Expression;
use crate::authz::types::AuthzRequest;

/// Predicate implemented outside the crate, referenced by name from policy
/// files once registered in a [`PredicateRegistry`].
pub trait Predicate: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(())` approves; `Forbidden`/`NotFound` reject this permission entry;
    /// any other error aborts the whole authorization call. `action` is the
    /// action being checked, for use in `Forbidden`.
    fn evaluate(&self, request: &AuthzRequest<'_>, action: &str) -> Result<(), AuthzError>;
}

#[derive(Clone)]
pub enum Condition {
    /// The resource's owner is the actor.
    Owner,
    /// The actor owns the resource or the resource is shared with them.
    /// Resources without a sharing capability are malformed for this check.
    OwnerOrShared,
    Expression(Expression),
    Custom(Arc<dyn Predicate>),
    /// Reports a rejection of the inner condition as `NotFound`, so the actor
    /// cannot tell the resource exists.
    Conceal(Box<Condition>),
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Owner => f.write_str("Owner"),
            Condition::OwnerOrShared => f.write_str("OwnerOrShared"),
            Condition::Expression(expr) => {
                f.debug_tuple("Expression").field(&expr.source()).finish()
            }
            Condition::Custom(predicate) => {
                f.debug_tuple("Custom").field(&predicate.name()).finish()
            }
            Condition::Conceal(inner) => f.debug_tuple("Conceal").field(inner).finish(),
        }
    }
}

impl Condition {
    pub fn expression(source: &str) -> Result<Self, PolicyError> {
        Expression::parse(source).map(Condition::Expression)
    }

    pub fn custom(predicate: impl Predicate + 'static) -> Self {
        Condition::Custom(Arc::new(predicate))
    }

    pub fn concealed(self) -> Self {
        Condition::Conceal(Box::new(self))
    }

    /// The action being checked is passed so denials can name it.
    pub fn evaluate(&self, request: &AuthzRequest<'_>, action: &str) -> Result<(), AuthzError> {
        request.context.check()?;
        match self {
            Condition::Owner => {
                if is_owner(request)? {
                    Ok(())
                } else {
                    Err(AuthzError::forbidden(action))
                }
            }
            Condition::OwnerOrShared => {
                if is_owner(request)? {
                    return Ok(());
                }
                let actor = request.actor()?;
                let resource = request.resource()?;
                let shared = resource.shared().ok_or_else(|| {
                    AuthzError::MalformedRequest(format!(
                        "resource kind `{}` does not expose a sharing list",
                        resource.kind()
                    ))
                })?;
                if shared.is_shared_with(&actor.id) {
                    Ok(())
                } else {
                    Err(AuthzError::forbidden(action))
                }
            }
            Condition::Expression(expr) => {
                if expr.evaluate(&expression_document(request)?)? {
                    Ok(())
                } else {
                    Err(AuthzError::forbidden(action))
                }
            }
            Condition::Custom(predicate) => predicate.evaluate(request, action),
            Condition::Conceal(inner) => match inner.evaluate(request, action) {
                Err(AuthzError::Forbidden { .. }) => Err(AuthzError::NotFound),
                other => other,
            },
        }
    }
}

fn is_owner(request: &AuthzRequest<'_>) -> Result<bool, AuthzError> {
    let actor = request.actor()?;
    let resource = request.resource()?;
    Ok(!actor.id.is_empty() && resource.owner() == Some(actor.id.as_str()))
}

/// JSON view of the request that expression conditions are evaluated on.
fn expression_document(request: &AuthzRequest<'_>) -> Result<Value, AuthzError> {
    let actor = request.actor()?;
    let resource = request.resource()?;

    let mut resource_doc = resource.attributes();
    resource_doc.insert("kind".into(), json!(resource.kind()));
    resource_doc.insert("owner".into(), json!(resource.owner()));

    Ok(json!({
        "actor": { "id": actor.id, "role": actor.role },
        "resource": resource_doc,
        "actions": request.actions,
        "context": request.context.attributes,
    }))
}

/// Named custom predicates available to the policy file parser.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<dyn Predicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, predicate: impl Predicate + 'static) -> &mut Self {
        self.predicates
            .insert(predicate.name().to_string(), Arc::new(predicate));
        self
    }

    /// Built-in names first, then registered predicates.
    pub fn lookup(&self, name: &str) -> Result<Condition, PolicyError> {
        match name {
            "owner" => Ok(Condition::Owner),
            "owner-or-shared" => Ok(Condition::OwnerOrShared),
            other => self
                .predicates
                .get(other)
                .cloned()
                .map(Condition::Custom)
                .ok_or_else(|| PolicyError::UnknownPredicate(other.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}
