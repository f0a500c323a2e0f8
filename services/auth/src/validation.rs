//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let length = password.chars().count();

    if length < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if length > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}

/// Validate the optional confirmation password
pub fn validate_password_confirmation(password: &str, confirmation: &str) -> Result<(), String> {
    if !confirmation.is_empty() && confirmation != password {
        return Err("Passwords do not match".to_string());
    }

    Ok(())
}

/// Validate a name field against its maximum length
pub fn validate_name(name: &str, max_len: usize) -> Result<(), String> {
    if name.chars().count() > max_len {
        return Err(format!("Must be at most {} characters long", max_len));
    }

    Ok(())
}
