use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid env entry '{entry}' for provider {alias}, expected KEY=VALUE")]
    InvalidEnvEntry { alias: String, entry: String },
        #[error("Invalid server address {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings key to the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("NEXUS_{}", field.replace('.', "__").to_uppercase())
}
