//! Input validation for API requests.
//!
//! Validation functions return `Result<(), String>` so handlers can collect
//! messages with the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape check; deliverability is the mail server's problem
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ).unwrap();

    /// Regex for validating UUIDv4-shaped identifiers in path params
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email é obrigatório".to_string());
    }

    if email.len() > 254 {
        return Err("Email muito longo".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Email inválido".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Senha é obrigatória".to_string());
    }

    if password.len() < 6 {
        return Err("A senha deve ter pelo menos 6 caracteres".to_string());
    }

    if password.len() > 128 {
        return Err("Senha muito longa (máximo 128 caracteres)".to_string());
    }

    Ok(())
}

/// Validate a user or form name
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Nome é obrigatório".to_string());
    }

    if name.chars().count() > 100 {
        return Err("Nome muito longo (máximo 100 caracteres)".to_string());
    }

    Ok(())
}

/// Validate a field label
pub fn validate_label(label: &str) -> Result<(), String> {
    if label.trim().is_empty() {
        return Err("Label é obrigatório".to_string());
    }

    if label.chars().count() > 200 {
        return Err("Label muito longo (máximo 200 caracteres)".to_string());
    }

    Ok(())
}

/// Validate an optional description
pub fn validate_description(description: &Option<String>) -> Result<(), String> {
    if let Some(d) = description {
        if d.chars().count() > 500 {
            return Err("Descrição muito longa (máximo 500 caracteres)".to_string());
        }
    }

    Ok(())
}

/// Validate a path identifier before it reaches a query
pub fn validate_uuid(id: &str) -> Result<(), String> {
    if !UUID_REGEX.is_match(id) {
        return Err("Identificador inválido".to_string());
    }

    Ok(())
}
