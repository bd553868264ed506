use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings key such as `alpha_vantage.api_key` to the environment
/// variable that sets it
pub fn to_env_var(field: &str) -> String {
    match field {
        "alpha_vantage.api_key" | "api_key" => "ALPHA_VANTAGE_API_KEY".to_string(),
        _ => format!("FINANCE_{}", field.replace('.', "__").to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("server.port"), "FINANCE_SERVER__PORT");
        assert_eq!(to_env_var("alpha_vantage.timeout_secs"), "FINANCE_ALPHA_VANTAGE__TIMEOUT_SECS");
        assert_eq!(to_env_var("alpha_vantage.api_key"), "ALPHA_VANTAGE_API_KEY");
    }
}
