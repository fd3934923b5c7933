//! Policy compiled into the binary, used when no policies directory is
//! configured.

use crate::authz::condition::Condition;
use crate::authz::types::{Grant, Permission, Role};
use crate::authz::Policy;

pub const VIEW_OWN: &str = "view_own";
pub const UPDATE_OWN: &str = "update_own";
pub const DELETE_OWN: &str = "delete_own";

pub fn policy() -> Policy {
    Policy::builder()
        .preset(VIEW_OWN, Grant::new("view").when(Condition::Owner))
        .preset(UPDATE_OWN, Grant::new("update").when(Condition::Owner))
        .preset(DELETE_OWN, Grant::new("delete").when(Condition::Owner))
        .role(default_role())
        .role(developer_role())
        .role(admin_role())
        .build()
}

fn default_role() -> Role {
    Role::new("default")
        .display_name("Default")
        .color("#6c757d")
        .permit("user", Permission::preset(VIEW_OWN))
        .permit("user", Permission::preset(UPDATE_OWN))
        .permit("user", Permission::preset(DELETE_OWN))
        .permit("user", Grant::new("list_email_accounts").when(Condition::Owner))
        .permit("email_account", Grant::new("create").when(Condition::Owner))
        .permit("email_account", Permission::preset(VIEW_OWN))
        .permit("email_account", Permission::preset(UPDATE_OWN))
        .permit("email_account", Permission::preset(DELETE_OWN))
        .permit("documentation", Permission::allow("view"))
        .permit("documentation", Grant::new("update").when(Condition::OwnerOrShared))
        .permit("documentation", Permission::preset(DELETE_OWN))
}

fn developer_role() -> Role {
    Role::new("developer")
        .display_name("Developer")
        .color("#0d6efd")
        .parent("default")
        .permit("documentation", Permission::allow("create"))
}

fn admin_role() -> Role {
    Role::new("admin")
        .display_name("Administrator")
        .color("#dc3545")
        .parent("developer")
        .permit("user", Permission::allow("view"))
        .permit("user", Permission::allow("update"))
        .permit("user", Permission::allow("delete"))
        .permit("user", Permission::allow("list_email_accounts"))
}
