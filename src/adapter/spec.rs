//! Adapter configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::adapter::errors::InvalidAdapterSpec;

/// How evaluation items are turned into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMethod {
    /// Free-form generation: one request per item, the model completes the eval block.
    Generation,
    /// Pure language modeling: the item input is scored as a token sequence, no templates.
    LanguageModeling,
    /// All references are listed as lettered choices in one prompt; the model answers with a letter.
    MultipleChoiceJoint,
    /// One scoring request per reference, with that reference rendered as the output.
    MultipleChoiceSeparate,
}

/// Settings of an adaptation run. Read-only once handed to an [Adapter](crate::adapter::Adapter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSpec {
    pub method: AdaptationMethod,
    /// Model name, forwarded to every request.
    pub model: String,
    /// Text leading the prompt, skipped when empty.
    pub instructions: String,
    pub input_prefix: String,
    pub output_prefix: String,
    /// Prefix of the first choice in [AdaptationMethod::MultipleChoiceJoint]. Its leading letter is advanced for
    /// each following choice ("A. ", "B. ", ...).
    pub reference_prefix: String,
    /// Joins instructions, in-context examples and the eval block.
    pub instance_separator: String,
    pub max_train_instances: usize,
    pub num_train_trials: usize,
    /// Adapt only the first N eval instances when set.
    pub max_eval_instances: Option<usize>,
    /// Completions requested per generation request.
    pub num_outputs: usize,
    /// Tokens reserved for the completion, on top of the prompt.
    pub max_tokens: usize,
    pub temperature: f64,
    pub stop_sequences: Vec<String>,
    /// Base seed. Trial `t` samples its examples with `seed + t`.
    pub seed: u64,
}

impl Default for AdapterSpec {
    fn default() -> Self {
        Self {
            method: AdaptationMethod::Generation,
            model: "openai/davinci".to_string(),
            instructions: String::new(),
            input_prefix: String::new(),
            output_prefix: String::new(),
            reference_prefix: "A. ".to_string(),
            instance_separator: "\n\n".to_string(),
            max_train_instances: 5,
            num_train_trials: 1,
            max_eval_instances: None,
            num_outputs: 1,
            max_tokens: 5,
            temperature: 1.0,
            stop_sequences: Vec::new(),
            seed: 0,
        }
    }
}

impl AdapterSpec {
    /// Default settings for the given method.
    pub fn new(method: AdaptationMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: AdapterSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_prefixes(mut self, input_prefix: impl Into<String>, output_prefix: impl Into<String>) -> Self {
        self.input_prefix = input_prefix.into();
        self.output_prefix = output_prefix.into();
        self
    }

    pub fn with_instance_separator(mut self, separator: impl Into<String>) -> Self {
        self.instance_separator = separator.into();
        self
    }

    pub fn with_max_train_instances(mut self, max_train_instances: usize) -> Self {
        self.max_train_instances = max_train_instances;
        self
    }

    pub fn with_num_train_trials(mut self, num_train_trials: usize) -> Self {
        self.num_train_trials = num_train_trials;
        self
    }

    pub fn with_max_eval_instances(mut self, max_eval_instances: usize) -> Self {
        self.max_eval_instances = Some(max_eval_instances);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check settings that do not depend on the tokenizer.
    pub fn validate(&self) -> Result<(), InvalidAdapterSpec> {
        if self.num_train_trials == 0 {
            return Err(InvalidAdapterSpec::new("num_train_trials", "must be at least 1"));
        }
        if self.num_outputs == 0 {
            return Err(InvalidAdapterSpec::new("num_outputs", "must be at least 1"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(InvalidAdapterSpec::new(
                "temperature",
                format!("must be a non-negative number, got {}", self.temperature),
            ));
        }
        if self.method == AdaptationMethod::MultipleChoiceJoint
            && !self.reference_prefix.starts_with(|c: char| c.is_ascii_uppercase())
        {
            return Err(InvalidAdapterSpec::new(
                "reference_prefix",
                format!("must start with an uppercase letter, got {:?}", self.reference_prefix),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_spec {
    use super::{AdaptationMethod, AdapterSpec};
    use crate::adapter::errors::InvalidAdapterSpec;

    #[test]
    fn test_from_json_defaults() {
        let spec = AdapterSpec::from_json(r#"{"method": "multiple_choice_joint", "max_train_instances": 4}"#).unwrap();
        assert_eq!(AdaptationMethod::MultipleChoiceJoint, spec.method);
        assert_eq!(4, spec.max_train_instances);
        assert_eq!(1, spec.num_train_trials);
        assert_eq!("\n\n", spec.instance_separator);
        assert_eq!("A. ", spec.reference_prefix);
    }

    #[test]
    fn test_from_json_rejects_negative_train_instances() {
        assert!(AdapterSpec::from_json(r#"{"max_train_instances": -1}"#).is_err());
    }

    #[test]
    fn test_from_json_rejects_zero_trials() {
        let err = AdapterSpec::from_json(r#"{"num_train_trials": 0}"#).unwrap_err();
        let invalid = err.downcast_ref::<InvalidAdapterSpec>().expect("expected InvalidAdapterSpec");
        assert_eq!("num_train_trials", invalid.field);
    }

    #[test]
    fn test_validate() {
        assert!(AdapterSpec::default().validate().is_ok());

        let mut spec = AdapterSpec::new(AdaptationMethod::MultipleChoiceJoint);
        spec.reference_prefix = "1. ".to_string();
        assert_eq!("reference_prefix", spec.validate().unwrap_err().field);

        let mut spec = AdapterSpec::default();
        spec.temperature = f64::NAN;
        assert_eq!("temperature", spec.validate().unwrap_err().field);

        let mut spec = AdapterSpec::default();
        spec.num_outputs = 0;
        assert_eq!("num_outputs", spec.validate().unwrap_err().field);
    }
}
