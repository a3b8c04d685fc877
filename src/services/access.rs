use uuid::Uuid;

use crate::models::{Identity, Role, UserLedger};

/// Proof that the caller is a regular member. Required by every
/// member-scoped operation; only [`Access::resolve`] hands one out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAccess {
    uid: Uuid,
    email: String,
}

impl MemberAccess {
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Proof that the caller is an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccess {
    uid: Uuid,
    email: String,
}

impl AdminAccess {
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Admin(AdminAccess),
    Member(MemberAccess),
}

impl Access {
    /// Picks the capability from the role stored on the ledger. The role is
    /// never taken from the token or the request.
    pub fn resolve(identity: &Identity, ledger: &UserLedger) -> Self {
        match ledger.role {
            Role::Admin => Access::Admin(AdminAccess {
                uid: identity.uid,
                email: identity.email.clone(),
            }),
            Role::User => Access::Member(MemberAccess {
                uid: identity.uid,
                email: identity.email.clone(),
            }),
        }
    }

    pub fn uid(&self) -> Uuid {
        match self {
            Access::Admin(admin) => admin.uid,
            Access::Member(member) => member.uid,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Access::Admin(_) => Role::Admin,
            Access::Member(_) => Role::User,
        }
    }
}
