//!
//! # Field validation
//!
//! [`FieldValidator`] accumulates at most one error message per field. The
//! first message recorded for a field wins; later checks against the same
//! field are ignored. Handlers run a battery of checks and then turn a
//! non-empty error map into `AppError::Validation` (HTTP 422).
//!
//! Declarative bounds on input types (`#[derive(Validate)]`) are merged in
//! through [`FieldValidator::check`], under the same first-wins rule.

mod strength;

use std::collections::BTreeMap;

use validator::Validate;

pub use strength::{PasswordPolicy, ScorePolicy, WeakPassword, MIN_PASSWORD_SCORE};

/// Field name to message, serialized in key order.
pub type FieldErrors = BTreeMap<String, String>;

pub const REQUIRED: &str = "must not be empty";
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only looks at the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub struct FieldValidator {
    errors: FieldErrors,
    policy: Box<dyn PasswordPolicy>,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self::with_policy(ScorePolicy::default())
    }

    pub fn with_policy(policy: impl PasswordPolicy + 'static) -> Self {
        Self {
            errors: FieldErrors::new(),
            policy: Box::new(policy),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    /// Records `message` for `field` unless the field already has one.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    /// Fails when `value` is empty after trimming surrounding whitespace.
    pub fn required_string(&mut self, value: &str, field: &str, message: &str) {
        if value.trim().is_empty() {
            self.add_error(field, message);
        }
    }

    /// Fails when `value` has fewer than `min` characters after trimming.
    pub fn min_string(&mut self, value: &str, min: usize, field: &str, message: &str) {
        if value.trim().chars().count() < min {
            self.add_error(field, message);
        }
    }

    /// Fails when `value` is longer than `max` bytes in UTF-8.
    pub fn max_bytes(&mut self, value: &str, max: usize, field: &str, message: &str) {
        if value.len() > max {
            self.add_error(field, message);
        }
    }

    /// Runs the password policy unless `field` already failed another check.
    pub fn check_password(&mut self, value: &str, field: &str) {
        if self.errors.contains_key(field) {
            return;
        }
        if let Err(WeakPassword(message)) = self.policy.check(value) {
            self.add_error(field, message);
        }
    }

    /// Merges the first violation of each declarative rule on `input`.
    pub fn check<V: Validate>(&mut self, input: &V) {
        let Err(report) = input.validate() else {
            return;
        };

        let mut fields: Vec<_> = report.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);
        for (field, violations) in fields {
            if let Some(first) = violations.first() {
                let message = match &first.message {
                    Some(message) => message.to_string(),
                    None => first.code.to_string(),
                };
                self.add_error(field, message);
            }
        }
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldValidator")
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
