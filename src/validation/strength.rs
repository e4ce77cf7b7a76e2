use zxcvbn::zxcvbn;

/// Lowest zxcvbn score (0 to 4) a password may have.
pub const MIN_PASSWORD_SCORE: u8 = 3;

/// Returned by a [`PasswordPolicy`] when a password is too weak.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct WeakPassword(pub String);

/// Opaque strength check consulted by `FieldValidator::check_password`.
pub trait PasswordPolicy: Send + Sync {
    fn check(&self, password: &str) -> Result<(), WeakPassword>;
}

/// Rejects passwords whose zxcvbn guessability score is below `min_score`.
///
/// The message carries zxcvbn's own warning and suggestions when it has any.
#[derive(Debug, Clone, Copy)]
pub struct ScorePolicy {
    min_score: u8,
}

impl ScorePolicy {
    pub fn new(min_score: u8) -> Self {
        Self { min_score }
    }
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self::new(MIN_PASSWORD_SCORE)
    }
}

impl PasswordPolicy for ScorePolicy {
    fn check(&self, password: &str) -> Result<(), WeakPassword> {
        let estimate = match zxcvbn(password, &[]) {
            Ok(estimate) => estimate,
            Err(_) => return Err(WeakPassword(longer_password())),
        };
        if estimate.score() >= self.min_score {
            return Ok(());
        }

        let mut hints = Vec::new();
        if let Some(feedback) = estimate.feedback() {
            if let Some(warning) = feedback.warning() {
                hints.push(warning.to_string());
            }
            hints.extend(feedback.suggestions().iter().map(ToString::to_string));
        }

        let message = if hints.is_empty() {
            longer_password()
        } else {
            format!("insecure password: {}", hints.join(" "))
        };
        Err(WeakPassword(message))
    }
}

fn longer_password() -> String {
    "insecure password, try using a longer password".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_strong_passwords() {
        let policy = ScorePolicy::default();
        assert!(policy.check("R#L:>t^9N?%o").is_ok());
        assert!(policy.check("Kq7!vB2#pZ9w").is_ok());
    }

    #[test]
    fn rejects_common_passwords_with_feedback() {
        let policy = ScorePolicy::default();
        for password in ["password", "Passw0rd", "qwertyuiop", "11111111"] {
            let err = policy.check(password).unwrap_err();
            assert!(err.0.starts_with("insecure password"), "{password}: {}", err.0);
        }
    }

    #[test]
    fn empty_password_is_weak() {
        let err = ScorePolicy::default().check("").unwrap_err();
        assert!(err.0.starts_with("insecure password"));
    }

    #[test]
    fn floor_is_configurable() {
        assert!(ScorePolicy::new(0).check("password").is_ok());
        assert!(ScorePolicy::new(4).check("password").is_err());
    }
}
