use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability contract of every authorizable entity.
pub trait Resource: Send + Sync {
    /// Selects which permission list of a role applies, e.g. "email_account".
    fn kind(&self) -> &str;

    /// Identity that owns this resource, if any. Collection-scoped resources
    /// usually have none.
    fn owner(&self) -> Option<&str>;

    /// Sharing capability, required by the `owner-or-shared` condition.
    fn shared(&self) -> Option<&dyn Shared> {
        None
    }

    /// Extra attributes exposed to expression conditions as `resource.<key>`.
    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Resources that can be shared with identities other than their owner.
pub trait Shared {
    fn is_shared_with(&self, identity: &str) -> bool;
}

/// Plain data resource, as received over the wire or built in tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    #[serde(default)]
    pub owner: Option<String>,
    /// `None` means the resource has no sharing capability at all, which is
    /// different from an empty sharing list.
    #[serde(default)]
    pub shared_with: Option<Vec<String>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn shared_with<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared_with = Some(identities.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

impl Resource for ResourceRecord {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn shared(&self) -> Option<&dyn Shared> {
        self.shared_with.as_ref().map(|_| self as &dyn Shared)
    }

    fn attributes(&self) -> Map<String, Value> {
        self.attributes.clone()
    }
}

impl Shared for ResourceRecord {
    fn is_shared_with(&self, identity: &str) -> bool {
        self.shared_with
            .as_ref()
            .is_some_and(|ids| ids.iter().any(|id| id == identity))
    }
}
