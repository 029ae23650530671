//! Role checks for operations restricted to administrators.
//!
//! Identity is established upstream; this module only receives the caller's
//! `{user_id, role}` and decides. Default-deny: anything that is not
//! explicitly an admin is refused for admin operations.

use serde::{Deserialize, Serialize};

use crate::models::Role;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Forbidden: {user_id} may not {action}")]
    Forbidden { action: String, user_id: String },
}

// ═══════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════

pub fn require_admin(ctx: &RequestContext, action: &str) -> Result<(), AuthorizationError> {
    if ctx.is_admin() {
        return Ok(());
    }
    tracing::warn!(user_id = %ctx.user_id, action, "Admin operation refused");
    Err(AuthorizationError::Forbidden {
        action: action.to_string(),
        user_id: ctx.user_id.clone(),
    })
}

/// Owners may act on their own records; admins on anyone's.
pub fn require_owner_or_admin(
    ctx: &RequestContext,
    owner_id: &str,
    action: &str,
) -> Result<(), AuthorizationError> {
    if ctx.user_id == owner_id {
        return Ok(());
    }
    require_admin(ctx, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_allowed() {
        let ctx = RequestContext::new("root", Role::Admin);
        assert!(require_admin(&ctx, "delete knowledge document").is_ok());
    }

    #[test]
    fn patient_is_forbidden() {
        let ctx = RequestContext::new("pat", Role::Patient);
        let err = require_admin(&ctx, "add knowledge document").unwrap_err();
        assert_eq!(
            err,
            AuthorizationError::Forbidden {
                action: "add knowledge document".into(),
                user_id: "pat".into(),
            }
        );
        assert_eq!(err.to_string(), "Forbidden: pat may not add knowledge document");
    }

    #[test]
    fn owner_or_admin_may_read_record() {
        let owner = RequestContext::new("alice", Role::Patient);
        let other = RequestContext::new("bob", Role::Patient);
        let admin = RequestContext::new("root", Role::Admin);
        assert!(require_owner_or_admin(&owner, "alice", "read report").is_ok());
        assert!(require_owner_or_admin(&admin, "alice", "read report").is_ok());
        assert!(require_owner_or_admin(&other, "alice", "read report").is_err());
    }
}
