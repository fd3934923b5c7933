use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

/// Outcome of a failed authorization call.
///
/// `Forbidden` and `NotFound` are ordinary denials. Everything else is a
/// caller or configuration defect and must not be reported as "access denied".
#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Malformed authorization request: {0}")]
    #[diagnostic(
        code(palisade::authz::malformed_request),
        help("A request needs an actor with a role, a resource with a kind, and at least one non-empty action")
    )]
    MalformedRequest(String),

    #[error("Role `{0}` is not defined")]
    #[diagnostic(
        code(palisade::authz::role_not_found),
        help("Check the role assigned to the user and the `parents` lists of your role definitions")
    )]
    RoleNotFound(String),

    #[error("Preset `{preset}` referenced by role `{role}` is not defined")]
    #[diagnostic(
        code(palisade::authz::preset_not_found),
        help("Define the preset with: preset \"<name>\" action=\"<action>\" {{ ... }}")
    )]
    PresetNotFound { preset: String, role: String },

    #[error("Cyclic role inheritance: {0}")]
    #[diagnostic(
        code(palisade::authz::inheritance_cycle),
        help("Check the `parents` lists in your role definitions for circular references")
    )]
    InheritanceCycle(String),

    #[error("Condition evaluation failed: {0}")]
    #[diagnostic(code(palisade::authz::condition_failed))]
    ConditionFailed(String),

    #[error("Action `{action}` is forbidden")]
    #[diagnostic(code(palisade::authz::forbidden))]
    Forbidden { action: String },

    #[error("Resource not found")]
    #[diagnostic(code(palisade::authz::not_found))]
    NotFound,

    #[error("Authorization cancelled")]
    #[diagnostic(code(palisade::authz::cancelled))]
    Cancelled,

    #[error("Authorization deadline exceeded")]
    #[diagnostic(code(palisade::authz::deadline_exceeded))]
    DeadlineExceeded,
}

impl AuthzError {
    pub fn forbidden(action: impl Into<String>) -> Self {
        AuthzError::Forbidden {
            action: action.into(),
        }
    }

    /// Legitimate, user-visible denial.
    pub fn is_denial(&self) -> bool {
        matches!(self, AuthzError::Forbidden { .. } | AuthzError::NotFound)
    }

    /// Defect in the policy configuration rather than in the request.
    pub fn is_config_defect(&self) -> bool {
        matches!(
            self,
            AuthzError::RoleNotFound(_)
                | AuthzError::PresetNotFound { .. }
                | AuthzError::InheritanceCycle(_)
                | AuthzError::ConditionFailed(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthzError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthzError::NotFound => StatusCode::NOT_FOUND,
            AuthzError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AuthzError::Cancelled | AuthzError::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "allowed": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Failure to load, parse, or validate a policy configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(palisade::policy::load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(palisade::policy::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(palisade::policy::invalid),
        help("Each policy file may contain only `preset` and `role` nodes")
    )]
    InvalidPolicy(String),

    #[error("Invalid condition expression: {0}")]
    #[diagnostic(
        code(palisade::policy::invalid_condition),
        help("Supported operators: ==, !=, >, <, >=, <=, &&, ||, !, in. Paths use dot notation (e.g. resource.owner)")
    )]
    InvalidCondition(String),

    #[error("Unknown condition predicate: {0}")]
    #[diagnostic(
        code(palisade::policy::unknown_predicate),
        help("Built-in predicates are `owner` and `owner-or-shared`; custom predicates must be registered before loading")
    )]
    UnknownPredicate(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(palisade::policy::undefined_role),
        help("Define the role with: role \"<name>\" {{ resource \"<kind>\" {{ ... }} }}")
    )]
    UndefinedRole(String),

    #[error("Undefined preset `{0}`")]
    #[diagnostic(
        code(palisade::policy::undefined_preset),
        help("Define the preset with: preset \"<name>\" action=\"<action>\" {{ ... }}")
    )]
    UndefinedPreset(String),

    #[error("Cyclic role inheritance detected: {0}")]
    #[diagnostic(
        code(palisade::policy::cyclic_roles),
        help("Check the `parents` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(palisade::policy::io))]
    Io(#[from] std::io::Error),
}
