//! Optimistic concurrency control for mutable records.
//!
//! A record carries an integer `version`. An update names the version the
//! caller last observed and is applied only if the stored row still has that
//! version, in which case the version is bumped by exactly one. Conflicts are
//! detected here and never prevented: no lock is taken on behalf of the
//! caller, who is expected to re-read and retry.
//!
//! Store adapters call [`apply_conditional`] while holding whatever exclusive
//! access their storage gives them for a single row (a write lock, a
//! `WHERE id = $1 AND version = $2` clause, ...).
use crate::core::error::StoreError;

pub trait Versioned {
    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);
}

/// Replace `stored` with `candidate` if their versions match, returning the new version.
///
/// On a mismatch `stored` is left untouched.
pub fn compare_and_swap<T: Versioned>(stored: &mut T, mut candidate: T) -> Result<i32, StoreError> {
    if stored.version() != candidate.version() {
        return Err(StoreError::EditConflict);
    }
    let next = stored
        .version()
        .checked_add(1)
        .ok_or_else(|| StoreError::Backend("version counter overflow".to_string()))?;
    candidate.set_version(next);
    *stored = candidate;
    Ok(next)
}

/// Conditional update against a row that may have disappeared.
///
/// Zero matching rows is reported as [`StoreError::EditConflict`], not
/// `NotFound`: a conditional update cannot tell a deleted row from a changed
/// one, so callers that care check existence beforehand.
pub fn apply_conditional<T: Versioned>(row: Option<&mut T>, candidate: T) -> Result<i32, StoreError> {
    match row {
        Some(stored) => compare_and_swap(stored, candidate),
        None => Err(StoreError::EditConflict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        body: &'static str,
        version: i32,
    }

    impl Versioned for Note {
        fn version(&self) -> i32 {
            self.version
        }

        fn set_version(&mut self, version: i32) {
            self.version = version;
        }
    }

    #[test]
    fn test_matching_version_is_applied_and_bumped() {
        let mut stored = Note { body: "a", version: 3 };
        let next = compare_and_swap(&mut stored, Note { body: "b", version: 3 }).unwrap();
        assert_eq!(next, 4);
        assert_eq!(stored, Note { body: "b", version: 4 });
    }

    #[test]
    fn test_stale_version_is_rejected_and_row_unchanged() {
        let mut stored = Note { body: "a", version: 4 };
        let err = compare_and_swap(&mut stored, Note { body: "b", version: 3 }).unwrap_err();
        assert_eq!(err, StoreError::EditConflict);
        assert_eq!(stored, Note { body: "a", version: 4 });
    }

    #[test]
    fn test_missing_row_is_an_edit_conflict() {
        let err = apply_conditional::<Note>(None, Note { body: "b", version: 1 }).unwrap_err();
        assert_eq!(err, StoreError::EditConflict);
    }

    #[test]
    fn test_second_writer_with_same_base_version_loses() {
        let mut stored = Note { body: "a", version: 1 };
        assert!(compare_and_swap(&mut stored, Note { body: "b", version: 1 }).is_ok());
        assert_eq!(
            compare_and_swap(&mut stored, Note { body: "c", version: 1 }),
            Err(StoreError::EditConflict)
        );
        assert_eq!(stored.body, "b");
    }
}
