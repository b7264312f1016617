// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.

use recall_core::RecallError;

use crate::model::RecallConfig;

/// Provider names the selection waterfall understands.
pub const KNOWN_PROVIDERS: [&str; 5] = ["auto", "local", "openai", "gemini", "openai-batch"];

/// Source classes that can be indexed.
pub const KNOWN_SOURCES: [&str; 2] = ["notes", "sessions"];

/// Validate cross-field constraints the serde model cannot express.
pub fn validate_config(config: &RecallConfig) -> Result<(), RecallError> {
    let memory = &config.memory;

    if !KNOWN_PROVIDERS.contains(&memory.provider.as_str()) {
        return Err(RecallError::Config(format!(
            "unknown provider '{}': expected one of {}",
            memory.provider,
            KNOWN_PROVIDERS.join(", ")
        )));
    }

    for source in &memory.sources {
        if !KNOWN_SOURCES.contains(&source.as_str()) {
            return Err(RecallError::Config(format!(
                "unknown source class '{source}': expected one of {}",
                KNOWN_SOURCES.join(", ")
            )));
        }
    }

    if memory.chunking.tokens == 0 {
        return Err(RecallError::Config(
            "chunking.tokens must be greater than zero".to_string(),
        ));
    }
    if memory.chunking.overlap >= memory.chunking.tokens {
        return Err(RecallError::Config(format!(
            "chunking.overlap ({}) must be smaller than chunking.tokens ({})",
            memory.chunking.overlap, memory.chunking.tokens
        )));
    }

    let hybrid = &memory.query.hybrid;
    if hybrid.vector_weight < 0.0 || hybrid.text_weight < 0.0 {
        return Err(RecallError::Config(
            "hybrid weights must be non-negative".to_string(),
        ));
    }
    if hybrid.vector_weight + hybrid.text_weight <= 0.0 {
        return Err(RecallError::Config(
            "at least one hybrid weight must be positive".to_string(),
        ));
    }
    if hybrid.candidate_multiplier == 0 {
        return Err(RecallError::Config(
            "hybrid.candidate_multiplier must be at least 1".to_string(),
        ));
    }

    if memory.query.max_results == 0 {
        return Err(RecallError::Config(
            "query.max_results must be at least 1".to_string(),
        ));
    }

    if memory.cache.max_entries == 0 {
        return Err(RecallError::Config(
            "cache.max_entries must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn default_config_is_valid() {
        let config = load_config_from_str("").unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = load_config_from_str(
            r#"
            [memory]
            provider = "cohere"
            "#,
        )
        .unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("cohere"));
    }

    #[test]
    fn overlap_must_be_smaller_than_tokens() {
        let config = load_config_from_str(
            r#"
            [memory.chunking]
            tokens = 100
            overlap = 100
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_weights_are_rejected() {
        let config = load_config_from_str(
            r#"
            [memory.query.hybrid]
            vector_weight = 0.0
            text_weight = 0.0
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn unknown_source_class_is_rejected() {
        let config = load_config_from_str(
            r#"
            [memory]
            sources = ["notes", "emails"]
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
