//! Snapshot tests for WatsonX client

#[cfg(test)]
mod snapshot_tests {
    use crate::{LLMProvider, WatsonxClient, WatsonxConfig};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_config_snapshot() {
        let config = WatsonxConfig {
            api_key: "test_api_key_redacted".to_string(),
            project_id: "test_project_id".to_string(),
            iam_url: "iam.cloud.ibm.com".to_string(),
            api_url: "https://us-south.ml.cloud.ibm.com".to_string(),
            model_id: "ibm/granite-3-3-8b-instruct".to_string(),
        };

        assert_yaml_snapshot!(config, @r###"
        ---
        api_key: test_api_key_redacted
        project_id: test_project_id
        iam_url: iam.cloud.ibm.com
        api_url: "https://us-south.ml.cloud.ibm.com"
        model_id: ibm/granite-3-3-8b-instruct
        "###);
    }

    #[test]
    fn test_with_model_overrides_config() {
        let config = WatsonxConfig::new("test_key".to_string(), "test_project".to_string());
        let client = WatsonxClient::new(config)
            .unwrap()
            .with_model(WatsonxClient::GRANITE_4_H_SMALL);

        assert_yaml_snapshot!(client.model_id(), @"ibm/granite-4-h-small");
    }

    #[test]
    fn test_model_override_keeps_configured_model_when_absent() {
        let mut config = WatsonxConfig::new("test_key".to_string(), "test_project".to_string());
        config.model_id = WatsonxClient::GRANITE_4_H_SMALL.to_string();

        let kept = WatsonxClient::new(config.clone())
            .unwrap()
            .with_model_override(None);
        assert_yaml_snapshot!(kept.model_id(), @"ibm/granite-4-h-small");

        let replaced = WatsonxClient::new(config)
            .unwrap()
            .with_model_override(Some(WatsonxClient::GRANITE_3_3_8B_INSTRUCT));
        assert_yaml_snapshot!(replaced.model_id(), @"ibm/granite-3-3-8b-instruct");
    }
}
