//! WatsonX configuration

use serde::{Deserialize, Serialize};
use std::env;

use crag_core::{Error, Result};

pub const DEFAULT_IAM_URL: &str = "iam.cloud.ibm.com";
pub const DEFAULT_API_URL: &str = "https://us-south.ml.cloud.ibm.com";
pub const DEFAULT_MODEL_ID: &str = "ibm/granite-3-3-8b-instruct";

/// Configuration for WatsonX AI client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatsonxConfig {
    pub api_key: String,
    pub project_id: String,
    pub iam_url: String,
    pub api_url: String,
    pub model_id: String,
}

impl WatsonxConfig {
    /// Create configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = non_empty("WATSONX_API_KEY")
            .or_else(|| non_empty("API_KEY"))
            .ok_or_else(|| {
                Error::Configuration(
                    "WATSONX_API_KEY or API_KEY environment variable not found".to_string(),
                )
            })?;

        let project_id = non_empty("WATSONX_PROJECT_ID")
            .or_else(|| non_empty("PROJECT_ID"))
            .ok_or_else(|| {
                Error::Configuration(
                    "WATSONX_PROJECT_ID or PROJECT_ID environment variable not found".to_string(),
                )
            })?;

        Ok(Self {
            api_key,
            project_id,
            iam_url: non_empty("IAM_IBM_CLOUD_URL").unwrap_or_else(|| DEFAULT_IAM_URL.to_string()),
            api_url: non_empty("WATSONX_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model_id: non_empty("WATSONX_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
        })
    }

    /// Create configuration with explicit values
    pub fn new(api_key: String, project_id: String) -> Self {
        Self {
            api_key,
            project_id,
            iam_url: DEFAULT_IAM_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_fill_optional_settings() {
        let config = WatsonxConfig::from_lookup(lookup(&[
            ("WATSONX_API_KEY", "key"),
            ("WATSONX_PROJECT_ID", "project"),
        ]))
        .unwrap();

        assert_eq!(config.iam_url, DEFAULT_IAM_URL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_fallback_variable_names() {
        let config = WatsonxConfig::from_lookup(lookup(&[
            ("API_KEY", "key"),
            ("PROJECT_ID", "project"),
            ("WATSONX_MODEL_ID", "ibm/granite-4-h-small"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "key");
        assert_eq!(config.model_id, "ibm/granite-4-h-small");
    }

    #[test]
    fn test_missing_credentials() {
        let err = WatsonxConfig::from_lookup(lookup(&[("WATSONX_PROJECT_ID", "p")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = WatsonxConfig::from_lookup(lookup(&[("WATSONX_API_KEY", "k"), ("WATSONX_PROJECT_ID", " ")]))
            .unwrap_err();
        assert!(err.to_string().contains("PROJECT_ID"));
    }
}
