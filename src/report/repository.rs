//! Repository identity parsing.

use crate::error::{CovtrackError, Result};

/// Split an `owner/repo` string into its two components.
///
/// Exactly one `/` separating two non-empty parts is accepted.
///
/// # Example
///
/// ```
/// use covtrack::split_repository;
///
/// assert_eq!(split_repository("octo/widgets").unwrap(), ("octo", "widgets"));
/// assert!(split_repository("widgets").is_err());
/// ```
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(CovtrackError::invalid_repository(repository)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_repository_valid() {
        assert_eq!(split_repository("owner/repo").unwrap(), ("owner", "repo"));
        assert_eq!(split_repository("rust-lang/cargo").unwrap(), ("rust-lang", "cargo"));
    }

    #[test]
    fn test_split_repository_rejects_malformed() {
        for input in ["", "owner", "/repo", "owner/", "/", "a/b/c"] {
            let err = split_repository(input).unwrap_err();
            assert!(
                matches!(err, CovtrackError::InvalidRepository { .. }),
                "{input:?} should be rejected"
            );
        }
    }
}
