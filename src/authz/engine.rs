use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::authz::condition::Condition;
use crate::authz::errors::AuthzError;
use crate::authz::types::{Actor, AuthzRequest};
use crate::authz::Policy;

/// Evaluates authorization requests against one policy snapshot.
#[derive(Debug, Clone)]
pub struct Authorizer {
    policy: Arc<Policy>,
}

/// Per-action search state: the ancestry chain of the role being examined,
/// and the first condition rejection seen anywhere in the search.
struct Search<'p> {
    chain: Vec<&'p str>,
    rejection: Option<AuthzError>,
}

impl Authorizer {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Succeeds only if every requested action is authorized. Actions are
    /// resolved in request order and the first failure is returned.
    pub fn authorize(&self, request: &AuthzRequest<'_>) -> Result<(), AuthzError> {
        let actor = validate(request)?;

        for action in &request.actions {
            request.context.check()?;
            if let Err(e) = self.authorize_action(actor, action, request) {
                if e.is_config_defect() {
                    error!(
                        actor = %actor.id, role = %actor.role, %action, error = %e,
                        "authorization failed on policy defect"
                    );
                } else if e.is_denial() {
                    debug!(
                        actor = %actor.id, role = %actor.role, %action, error = %e,
                        "authorization denied"
                    );
                } else {
                    warn!(
                        actor = %actor.id, role = %actor.role, %action, error = %e,
                        "authorization request rejected"
                    );
                }
                return Err(e);
            }
        }

        debug!(
            actor = %actor.id, role = %actor.role, actions = ?request.actions,
            "authorization granted"
        );
        Ok(())
    }

    fn authorize_action(
        &self,
        actor: &Actor,
        action: &str,
        request: &AuthzRequest<'_>,
    ) -> Result<(), AuthzError> {
        let mut search = Search {
            chain: Vec::new(),
            rejection: None,
        };
        if self.role_grants(&actor.role, action, request, &mut search)? {
            return Ok(());
        }
        Err(search.rejection.unwrap_or_else(|| AuthzError::forbidden(action)))
    }

    /// Whether `role_name` or one of its ancestors authorizes `action`.
    fn role_grants<'p>(
        &'p self,
        role_name: &'p str,
        action: &str,
        request: &AuthzRequest<'_>,
        search: &mut Search<'p>,
    ) -> Result<bool, AuthzError> {
        let role = self
            .policy
            .role(role_name)
            .ok_or_else(|| AuthzError::RoleNotFound(role_name.to_string()))?;
        let kind = request.resource()?.kind();

        for permission in role.permissions_for(kind) {
            let grant = self.policy.resolve(role_name, permission)?;
            if grant.action != action {
                continue;
            }
            match check_conditions(grant.conditions.as_slice(), request, action) {
                Ok(()) => {
                    debug!(role = role_name, %action, kind, "permission matched");
                    return Ok(true);
                }
                Err(e) if e.is_denial() => {
                    search.rejection.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        search.chain.push(role_name);
        for parent in &role.parents {
            if search.chain.contains(&parent.as_str()) {
                let mut cycle = search.chain.join(" -> ");
                cycle.push_str(" -> ");
                cycle.push_str(parent);
                return Err(AuthzError::InheritanceCycle(cycle));
            }
            if self.role_grants(parent, action, request, search)? {
                return Ok(true);
            }
        }
        search.chain.pop();

        Ok(false)
    }
}

/// All conditions must pass; the first failure decides.
fn check_conditions(
    conditions: &[Condition],
    request: &AuthzRequest<'_>,
    action: &str,
) -> Result<(), AuthzError> {
    conditions
        .iter()
        .try_for_each(|condition| condition.evaluate(request, action))
}

fn validate<'a>(request: &AuthzRequest<'a>) -> Result<&'a Actor, AuthzError> {
    let actor = request.actor()?;
    let resource = request.resource()?;

    if actor.role.is_empty() {
        return Err(AuthzError::MalformedRequest(format!("actor `{}` has no role", actor.id)));
    }
    if resource.kind().is_empty() {
        return Err(AuthzError::MalformedRequest("resource kind is empty".into()));
    }
    if request.actions.is_empty() {
        return Err(AuthzError::MalformedRequest("no actions requested".into()));
    }
    if request.actions.iter().any(|a| a.is_empty()) {
        return Err(AuthzError::MalformedRequest("empty action name".into()));
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::Predicate;
    use crate::authz::resource::ResourceRecord;
    use crate::authz::types::{Grant, Permission, RequestContext, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn authorizer(policy: Policy) -> Authorizer {
        Authorizer::new(Arc::new(policy))
    }

    fn ownership_policy() -> Policy {
        Policy::builder()
            .preset("update_own", Grant::new("update").when(Condition::Owner))
            .role(
                Role::new("default")
                    .permit("user", Permission::allow("view"))
                    .permit("user", Permission::preset("update_own")),
            )
            .build()
    }

    #[test]
    fn test_unconditional_permission() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "default");
        let profile = ResourceRecord::new("user").owned_by("u2");
        let request = AuthzRequest::new(&actor, &profile).action("view");
        assert!(authz.authorize(&request).is_ok());
    }

    #[test]
    fn test_owner_scenario() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "default");

        let theirs = ResourceRecord::new("user").owned_by("u2");
        let request = AuthzRequest::new(&actor, &theirs).action("update");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { .. })
        ));

        let mine = ResourceRecord::new("user").owned_by("u1");
        let request = AuthzRequest::new(&actor, &mine).action("update");
        assert!(authz.authorize(&request).is_ok());
    }

    #[test]
    fn test_unknown_kind_is_forbidden() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "default");
        let account = ResourceRecord::new("email_account").owned_by("u1");
        let request = AuthzRequest::new(&actor, &account).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_scanning_continues_after_rejected_entry() {
        let policy = Policy::builder()
            .role(
                Role::new("default")
                    .permit("documentation", Grant::new("update").when(Condition::Owner))
                    .permit(
                        "documentation",
                        Grant::new("update").when(Condition::OwnerOrShared),
                    ),
            )
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "default");
        let doc = ResourceRecord::new("documentation")
            .owned_by("u2")
            .shared_with(["u1"]);
        let request = AuthzRequest::new(&actor, &doc).action("update");
        assert!(authz.authorize(&request).is_ok());
    }

    #[test]
    fn test_malformed_condition_aborts_scan() {
        let policy = Policy::builder()
            .role(
                Role::new("default")
                    .permit("user", Grant::new("view").when(Condition::OwnerOrShared))
                    .permit("user", Permission::allow("view")),
            )
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "default");
        let profile = ResourceRecord::new("user").owned_by("u2");
        let request = AuthzRequest::new(&actor, &profile).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_parent_grants_action() {
        let policy = Policy::builder()
            .role(Role::new("default").permit("documentation", Permission::allow("view")))
            .role(Role::new("developer").parent("default"))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "developer");
        let doc = ResourceRecord::new("documentation");

        let request = AuthzRequest::new(&actor, &doc).action("view");
        assert!(authz.authorize(&request).is_ok());

        let request = AuthzRequest::new(&actor, &doc).action("delete");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_parents_tried_in_order() {
        let policy = Policy::builder()
            .role(Role::new("first").permit("documentation", Permission::allow("view")))
            .role(Role::new("second").parent("missing"))
            .role(Role::new("child").parent("first").parent("second"))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "child");
        let doc = ResourceRecord::new("documentation");

        // `first` grants before the broken `second` branch is visited.
        let request = AuthzRequest::new(&actor, &doc).action("view");
        assert!(authz.authorize(&request).is_ok());

        let request = AuthzRequest::new(&actor, &doc).action("delete");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::RoleNotFound(ref name)) if name == "missing"
        ));
    }

    #[test]
    fn test_cycle_detection() {
        let policy = Policy::builder()
            .role(Role::new("a").parent("b"))
            .role(Role::new("b").parent("a"))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "a");
        let doc = ResourceRecord::new("documentation");
        let request = AuthzRequest::new(&actor, &doc).action("view");

        match authz.authorize(&request) {
            Err(AuthzError::InheritanceCycle(chain)) => assert_eq!(chain, "a -> b -> a"),
            other => panic!("expected InheritanceCycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let policy = Policy::builder().role(Role::new("a").parent("a")).build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "a");
        let doc = ResourceRecord::new("documentation");
        let request = AuthzRequest::new(&actor, &doc).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn test_diamond_inheritance_is_not_a_cycle() {
        let policy = Policy::builder()
            .role(Role::new("base"))
            .role(Role::new("left").parent("base"))
            .role(Role::new("right").parent("base"))
            .role(Role::new("top").parent("left").parent("right"))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "top");
        let doc = ResourceRecord::new("documentation");
        let request = AuthzRequest::new(&actor, &doc).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_concealed_rejection_surfaces() {
        let policy = Policy::builder()
            .role(Role::new("default").permit(
                "email_account",
                Grant::new("view").when(Condition::Owner.concealed()),
            ))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "default");
        let account = ResourceRecord::new("email_account").owned_by("u2");
        let request = AuthzRequest::new(&actor, &account).action("view");
        assert!(matches!(authz.authorize(&request), Err(AuthzError::NotFound)));
    }

    #[test]
    fn test_missing_preset_is_defect() {
        let policy = Policy::builder()
            .role(Role::new("default").permit("user", Permission::preset("ghost")))
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "default");
        let profile = ResourceRecord::new("user");
        let request = AuthzRequest::new(&actor, &profile).action("view");
        let err = authz.authorize(&request).unwrap_err();
        assert!(err.is_config_defect());
    }

    struct Counting(Arc<AtomicUsize>);

    impl Predicate for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn evaluate(&self, _request: &AuthzRequest<'_>, _action: &str) -> Result<(), AuthzError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_preset_matches_inlined_grant() {
        let grant = || Grant::new("update").when(Condition::Owner);
        let with_preset = authorizer(
            Policy::builder()
                .preset("p", grant())
                .role(Role::new("default").permit("user", Permission::preset("p")))
                .build(),
        );
        let inlined = authorizer(
            Policy::builder()
                .role(Role::new("default").permit("user", grant()))
                .build(),
        );

        let actor = Actor::new("u1", "default");
        for owner in ["u1", "u2"] {
            let resource = ResourceRecord::new("user").owned_by(owner);
            for action in ["update", "view"] {
                let request = AuthzRequest::new(&actor, &resource).action(action);
                let a = with_preset.authorize(&request);
                let b = inlined.authorize(&request);
                assert_eq!(a.is_ok(), b.is_ok(), "owner={owner} action={action}");
                assert_eq!(
                    a.err().map(|e| e.to_string()),
                    b.err().map(|e| e.to_string()),
                    "owner={owner} action={action}"
                );
            }
        }
    }

    #[test]
    fn test_first_failed_action_stops_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = Policy::builder()
            .role(
                Role::new("default")
                    .permit("user", Grant::new("update").when(Condition::Owner))
                    .permit(
                        "user",
                        Grant::new("view").when(Condition::custom(Counting(calls.clone()))),
                    ),
            )
            .build();
        let authz = authorizer(policy);
        let actor = Actor::new("u1", "default");
        let theirs = ResourceRecord::new("user").owned_by("u2");

        let request = AuthzRequest::new(&actor, &theirs).actions(["update", "view"]);
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { ref action }) if action == "update"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let request = AuthzRequest::new(&actor, &theirs).actions(["view", "update"]);
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::Forbidden { ref action }) if action == "update"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_requests() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "default");
        let profile = ResourceRecord::new("user");

        let no_actions = AuthzRequest::new(&actor, &profile);
        assert!(matches!(
            authz.authorize(&no_actions),
            Err(AuthzError::MalformedRequest(_))
        ));

        let empty_action = AuthzRequest::new(&actor, &profile).actions(["view", ""]);
        assert!(matches!(
            authz.authorize(&empty_action),
            Err(AuthzError::MalformedRequest(_))
        ));

        let roleless = Actor::new("u1", "");
        let request = AuthzRequest::new(&roleless, &profile).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::MalformedRequest(_))
        ));

        let kindless = ResourceRecord::new("");
        let request = AuthzRequest::new(&actor, &kindless).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::MalformedRequest(_))
        ));

        let no_actor = AuthzRequest {
            actor: None,
            resource: Some(&profile),
            actions: vec!["view".into()],
            context: RequestContext::default(),
        };
        assert!(matches!(
            authz.authorize(&no_actor),
            Err(AuthzError::MalformedRequest(_))
        ));

        let no_resource = AuthzRequest {
            actor: Some(&actor),
            resource: None,
            actions: vec!["view".into()],
            context: RequestContext::default(),
        };
        assert!(matches!(
            authz.authorize(&no_resource),
            Err(AuthzError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_unknown_role_is_not_forbidden() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "ghost");
        let profile = ResourceRecord::new("user");
        let request = AuthzRequest::new(&actor, &profile).action("view");
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::RoleNotFound(_))
        ));
    }

    #[test]
    fn test_expired_deadline() {
        let authz = authorizer(ownership_policy());
        let actor = Actor::new("u1", "default");
        let profile = ResourceRecord::new("user");
        let request = AuthzRequest::new(&actor, &profile)
            .action("view")
            .with_context(RequestContext::new().with_deadline(Instant::now()));
        assert!(matches!(
            authz.authorize(&request),
            Err(AuthzError::DeadlineExceeded)
        ));
    }
}
