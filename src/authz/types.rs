use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::authz::condition::Condition;
use crate::authz::errors::AuthzError;
use crate::authz::resource::Resource;

// ---------- Policy domain types ----------

/// An action together with the conditions that must all hold for it.
#[derive(Debug, Clone)]
pub struct Grant {
    pub action: String,
    pub conditions: Vec<Condition>,
}

impl Grant {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A permission entry in a role's per-kind list.
#[derive(Debug, Clone)]
pub enum Permission {
    Inline(Grant),
    /// Name of a preset in the policy's preset table.
    Preset(String),
}

impl Permission {
    pub fn allow(action: impl Into<String>) -> Self {
        Permission::Inline(Grant::new(action))
    }

    pub fn preset(name: impl Into<String>) -> Self {
        Permission::Preset(name.into())
    }
}

impl From<Grant> for Permission {
    fn from(grant: Grant) -> Self {
        Permission::Inline(grant)
    }
}

#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub display_name: String,
    /// Cosmetic only.
    pub color: Option<String>,
    /// resource kind -> ordered permissions
    pub permissions: HashMap<String, Vec<Permission>>,
    /// Parent role names, tried in declaration order.
    pub parents: Vec<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            color: None,
            permissions: HashMap::new(),
            parents: Vec::new(),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn permit(mut self, kind: impl Into<String>, permission: impl Into<Permission>) -> Self {
        self.permissions
            .entry(kind.into())
            .or_default()
            .push(permission.into());
        self
    }

    /// Permissions declared for `kind`, empty when the role defines none.
    pub fn permissions_for(&self, kind: &str) -> &[Permission] {
        self.permissions
            .get(kind)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

// ---------- Request types ----------

/// The authenticated identity performing the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// Ambient cancellation, deadline and attributes for one authorization call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    /// Visible to expression conditions as `context.<key>`.
    pub attributes: Map<String, Value>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Fails fast once the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<(), AuthzError> {
        if self.cancel.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(AuthzError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// A single authorization question: may `actor` perform every one of
/// `actions` on `resource`?
pub struct AuthzRequest<'a> {
    pub actor: Option<&'a Actor>,
    pub resource: Option<&'a dyn Resource>,
    pub actions: Vec<String>,
    pub context: RequestContext,
}

impl<'a> AuthzRequest<'a> {
    pub fn new(actor: &'a Actor, resource: &'a dyn Resource) -> Self {
        Self {
            actor: Some(actor),
            resource: Some(resource),
            actions: Vec::new(),
            context: RequestContext::default(),
        }
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn actor(&self) -> Result<&'a Actor, AuthzError> {
        self.actor
            .ok_or_else(|| AuthzError::MalformedRequest("missing actor".into()))
    }

    pub fn resource(&self) -> Result<&'a dyn Resource, AuthzError> {
        self.resource
            .ok_or_else(|| AuthzError::MalformedRequest("missing resource".into()))
    }
}
