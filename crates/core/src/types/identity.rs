//! Acting identity the cart is scoped to.

use serde::{Deserialize, Serialize};

use super::id::SubjectId;

/// Kind of session behind an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityKind {
    /// Throwaway guest record. Its cart is abandoned on logout.
    Guest,
    /// Registered customer.
    User,
}

/// The user or guest session a cart belongs to.
///
/// Issued by the authentication layer; the cart only cares about the opaque
/// subject id and whether the session is a guest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Subject id sent to the backend with every cart request.
    pub subject: SubjectId,
    /// Session kind.
    pub kind: IdentityKind,
}

impl Identity {
    /// Identity for a registered user.
    #[must_use]
    pub const fn user(subject: SubjectId) -> Self {
        Self {
            subject,
            kind: IdentityKind::User,
        }
    }

    /// Identity for a guest session.
    #[must_use]
    pub const fn guest(subject: SubjectId) -> Self {
        Self {
            subject,
            kind: IdentityKind::Guest,
        }
    }

    /// Returns true for guest sessions.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self.kind, IdentityKind::Guest)
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest => write!(f, "guest"),
            Self::User => write!(f, "user"),
        }
    }
}
