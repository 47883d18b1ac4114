//! Account input normalization and validation.
//!
//! Usernames are case-sensitive and stored as given (after trimming).
//! Emails are trimmed and lowercased before storage and lookup.

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 64;

/// Maximum email length in bytes.
pub const MAX_EMAIL_LEN: usize = 254;

/// bcrypt ignores input beyond 72 bytes; longer passwords are rejected
/// instead of being silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Trim and validate a username, returning the stored form.
pub fn validate_username(raw: &str) -> crate::Result<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(crate::Error::InvalidUsername(
            "username is required".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(crate::Error::InvalidUsername(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(crate::Error::InvalidUsername(
            "username must not contain whitespace or control characters".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Trim, lowercase and validate an email address, returning the stored form.
pub fn normalize_email(raw: &str) -> crate::Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(crate::Error::InvalidEmail("email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(crate::Error::InvalidEmail(format!(
            "email must be at most {MAX_EMAIL_LEN} bytes"
        )));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(crate::Error::InvalidEmail(
            "email must contain exactly one '@'".to_string(),
        ));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(crate::Error::InvalidEmail(
            "email must have a local part and a domain".to_string(),
        ));
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(crate::Error::InvalidEmail(
            "email must not contain whitespace".to_string(),
        ));
    }
    Ok(email)
}

/// Validate a plaintext password before hashing.
pub fn validate_password(password: &str) -> crate::Result<()> {
    if password.is_empty() {
        return Err(crate::Error::InvalidPassword(
            "password is required".to_string(),
        ));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(crate::Error::InvalidPassword(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_trimmed_and_case_preserved() {
        assert_eq!(validate_username("  Alice ").unwrap(), "Alice");
    }

    #[test]
    fn test_username_rejects_empty_and_inner_whitespace() {
        assert!(validate_username("   ").is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username("bob\n").is_ok());
        assert!(validate_username("bo\tb").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_email_lowercased() {
        assert_eq!(
            normalize_email(" Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn test_email_shape() {
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("alice@").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn test_password_bounds() {
        assert!(validate_password("").is_err());
        assert!(validate_password("hunter2").is_ok());
        assert!(validate_password(&"p".repeat(72)).is_ok());
        assert!(validate_password(&"p".repeat(73)).is_err());
    }
}
