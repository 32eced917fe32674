use thiserror::Error;

/// Longest account name the chain accepts
const MAX_ACCOUNT_NAME_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid account name: {0}")]
    InvalidAccountName(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
}

/// Account names are 1 to 12 characters of `a-z`, `1-5` and `.`, and may not
/// end with a dot.
pub fn validate_account_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingParameter("account".to_string()));
    }

    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || ('1'..='5').contains(&c) || c == '.');

    if name.len() > MAX_ACCOUNT_NAME_LEN || !valid_chars || name.ends_with('.') {
        return Err(ValidationError::InvalidAccountName(name.to_string()));
    }

    Ok(())
}

/// Token symbols are 1 to 7 uppercase letters
pub fn validate_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.trim().is_empty() {
        return Err(ValidationError::MissingParameter("symbol".to_string()));
    }

    if symbol.len() > 7 || !symbol.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }

    Ok(())
}

/// Contract code may be left empty to mean the default token contract
pub fn validate_contract(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Ok(());
    }
    validate_account_name(code)
}
