//! Field-level input validation collecting one message per field.
use std::{collections::HashSet, hash::Hash};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::{AppError, AppResult, FieldErrors};

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|e| unreachable!("email pattern is a valid regex: {e}"))
});

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` for `key` unless that field already has one.
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded, `FailedValidation` otherwise.
    pub fn finish(self) -> AppResult<()> {
        if self.valid() {
            Ok(())
        } else {
            Err(AppError::FailedValidation(self.errors))
        }
    }
}

pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let distinct: HashSet<&T> = values.iter().collect();
    distinct.len() == values.len()
}

pub fn matches_email(value: &str) -> bool {
    EMAIL_RX.is_match(value)
}
