use crate::utils::error::{BatchError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

const DATABASE_SCHEMES: [&str; 3] = ["postgres", "postgresql", "sqlite"];

pub fn validate_database_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.trim().is_empty() {
        return Err(BatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "Database URL cannot be empty".to_string(),
        });
    }

    // 未替換的環境變數 (例如 ${DATABASE_URL}) 會在這裡被擋下
    if url_str.contains("${") {
        return Err(BatchError::MissingConfigError {
            field: format!("{} (unresolved variable in '{}')", field_name, url_str),
        });
    }

    match Url::parse(url_str) {
        Ok(url) if DATABASE_SCHEMES.contains(&url.scheme()) => Ok(()),
        Ok(url) => Err(BatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: redact(url_str),
            reason: format!(
                "Unsupported database scheme: {}. Supported: {}",
                url.scheme(),
                DATABASE_SCHEMES.join(", ")
            ),
        }),
        Err(e) => Err(BatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: redact(url_str),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

/// 隱藏連線字串中的密碼
pub fn redact(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        Ok(_) => url_str.to_string(),
        Err(_) => "<redacted>".to_string(),
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(BatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}
