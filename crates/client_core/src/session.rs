use std::fmt;

use shared::domain::UserId;
use zeroize::Zeroizing;

/// Bearer token issued by the auth service. Wiped from memory on drop.
#[derive(Clone)]
pub struct AuthToken(Zeroizing<String>);

impl AuthToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Identity of the signed-in user, handed to every component at construction.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    token: AuthToken,
}

impl Session {
    pub fn new(user_id: impl Into<UserId>, token: AuthToken) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    pub fn is_current_user(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
