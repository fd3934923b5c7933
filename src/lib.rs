//! Palisade - role-based authorization engine
//!
//! Roles with ordered parents, per-resource-kind permissions, shared
//! presets and condition predicates, evaluated fail-closed. The HTTP check
//! API and the binary are thin layers over [`authz::Authorizer`].

pub mod authz;
pub mod errors;
pub mod settings;
