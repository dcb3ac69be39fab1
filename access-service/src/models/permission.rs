//! Permission token validation.
//!
//! Permission tokens are dotted lowercase identifiers like `payroll.approve`.
//! Admin operations validate tokens against the tenant's registry; decision
//! paths never do.

use crate::services::ServiceError;

/// Maximum accepted token length.
pub const MAX_PERMISSION_LENGTH: usize = 128;

/// Validate the shape of a permission token: two or more dot-separated
/// segments, each starting with a letter and containing only lowercase
/// letters, digits and underscores.
pub fn validate_permission_token(token: &str) -> Result<(), ServiceError> {
    if token.is_empty() || token.len() > MAX_PERMISSION_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Permission token must be 1-{} characters",
            MAX_PERMISSION_LENGTH
        )));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() < 2 {
        return Err(ServiceError::Validation(format!(
            "Permission token '{}' must contain at least two dot-separated segments",
            token
        )));
    }

    for segment in segments {
        let mut chars = segment.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false);
        let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_head || !valid_tail {
            return Err(ServiceError::Validation(format!(
                "Permission token '{}' has an invalid segment",
                token
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_tokens() {
        assert!(validate_permission_token("payroll.approve").is_ok());
        assert!(validate_permission_token("payroll.run.close_period").is_ok());
        assert!(validate_permission_token("reports.export2").is_ok());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(validate_permission_token("").is_err());
        assert!(validate_permission_token("payroll").is_err());
        assert!(validate_permission_token("Payroll.Approve").is_err());
        assert!(validate_permission_token("payroll..approve").is_err());
        assert!(validate_permission_token("payroll.1approve").is_err());
        assert!(validate_permission_token(&"a.".repeat(100)).is_err());
    }
}
