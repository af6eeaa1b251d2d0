use thiserror::Error;

#[derive(Debug, Error)]
#[error("no acting user configured; set identity.user_id or CURRICULA_USER")]
pub struct IdentityError;

/// Supplies the id of the acting user for submitter stamping.
pub trait IdentityProvider {
    fn current_user_id(&self) -> Result<String, IdentityError>;
}

/// Identity resolved once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfiguredIdentity {
    user_id: Option<String>,
}

impl ConfiguredIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: user_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        }
    }

    /// `override_id` (usually `CURRICULA_USER`) wins over the configured id.
    pub fn resolve(configured: Option<String>, override_id: Option<String>) -> Self {
        let from_override = Self::new(override_id);
        if from_override.user_id.is_some() {
            from_override
        } else {
            Self::new(configured)
        }
    }
}

impl IdentityProvider for ConfiguredIdentity {
    fn current_user_id(&self) -> Result<String, IdentityError> {
        self.user_id.clone().ok_or(IdentityError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_and_blank_ids_are_missing() {
        let identity = ConfiguredIdentity::resolve(Some("u-1".into()), Some("u-2".into()));
        assert_eq!(identity.current_user_id().expect("id"), "u-2");

        let identity = ConfiguredIdentity::resolve(Some("u-1".into()), Some("  ".into()));
        assert_eq!(identity.current_user_id().expect("id"), "u-1");

        assert!(ConfiguredIdentity::new(None).current_user_id().is_err());
    }
}
