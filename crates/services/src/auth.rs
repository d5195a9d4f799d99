use std::sync::{Arc, PoisonError, RwLock};

use study_core::model::UserId;

/// Who is signed in, independent of any auth provider's session shape.
pub trait AuthContext: Send + Sync {
    /// The authenticated user, or `None` for anonymous/demo use.
    fn current_user_id(&self) -> Option<UserId>;
}

/// Session holder the app updates on sign-in and sign-out.
#[derive(Clone, Default)]
pub struct SessionAuth {
    user: Arc<RwLock<Option<UserId>>>,
}

impl SessionAuth {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user: UserId) -> Self {
        Self {
            user: Arc::new(RwLock::new(Some(user))),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthContext for SessionAuth {
    fn current_user_id(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out_are_shared_across_clones() {
        let auth = SessionAuth::anonymous();
        let view = auth.clone();
        assert_eq!(view.current_user_id(), None);

        auth.sign_in(UserId::new("u-42"));
        assert_eq!(view.current_user_id(), Some(UserId::new("u-42")));

        auth.sign_out();
        assert_eq!(view.current_user_id(), None);
    }
}
