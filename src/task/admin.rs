//! The single privileged identity fixed at server startup.

use super::id::TaskId;
use crate::error::{Error, Result};

/// Holds the admin task identity. Never rotated.
#[derive(Debug, Clone)]
pub struct AdminAuthority {
    id: TaskId,
}

impl AdminAuthority {
    /// Generate a fresh admin identity.
    pub fn generate() -> Self {
        Self {
            id: TaskId::generate(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn is_admin(&self, id: &TaskId) -> bool {
        self.id == *id
    }

    /// Gate for privileged operations.
    pub fn authorize(&self, id: &TaskId) -> Result<()> {
        if self.is_admin(id) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_admin_id_is_authorized() {
        let admin = AdminAuthority::generate();
        assert!(admin.is_admin(&admin.id().clone()));
        assert!(admin.authorize(admin.id()).is_ok());

        let other = TaskId::generate();
        assert!(!admin.is_admin(&other));
        assert!(matches!(admin.authorize(&other), Err(Error::Unauthorized)));
    }
}
