//! # Adapter
//! The adapter turns scenario instances into model requests that fit the model's context window.
//!
//! ## Trials
//! A run repeats [Adapter::adapt] over `num_train_trials` trials. Each trial samples its own set of in-context
//! examples once (see [sampling]) with a trial-specific seed and reuses it for every eval instance, so the variance
//! across trials measures the effect of the few-shot draw.
//!
//! ## Methods
//! What a request looks like depends on [AdaptationMethod]:
//! * [Generation](AdaptationMethod::Generation) and [MultipleChoiceJoint](AdaptationMethod::MultipleChoiceJoint):
//!   one request per instance and trial.
//! * [MultipleChoiceSeparate](AdaptationMethod::MultipleChoiceSeparate): one scoring request per reference.
//! * [LanguageModeling](AdaptationMethod::LanguageModeling): one scoring request per instance, built from tokens
//!   rather than templates (see [language_modeling]).
//!
//! Every emitted prompt passed the tokenizer's window check. An instance that cannot be made to fit aborts the run
//! with an [UnfittablePrompt](errors::UnfittablePrompt) error.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::adapter::errors::InvalidAdapterSpec;
use crate::scenario::{Instance, Split};
use crate::utils::token::{Token, Tokenizer};

pub mod spec;
pub mod sampling;
pub mod prompt;
pub mod language_modeling;

pub use spec::{AdaptationMethod, AdapterSpec};

/// What the model-serving backend executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub model: String,
    pub prompt: String,
    pub num_completions: usize,
    pub temperature: f64,
    /// Tokens to generate. 0 for scoring requests.
    pub max_tokens: usize,
    pub stop_sequences: Vec<String>,
    /// Whether the backend returns the prompt tokens (with log probabilities) alongside the completion.
    pub echo_prompt: bool,
}

/// One request descriptor, identified by (instance, trial, reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    /// Index into [ScenarioState::instances].
    pub instance_index: usize,
    pub train_trial_index: usize,
    /// The reference being scored, for [AdaptationMethod::MultipleChoiceSeparate].
    pub reference_index: Option<usize>,
    pub request: Request,
    /// In-context examples sampled for the trial, before truncation.
    pub num_train_instances: usize,
    /// Leading prompt tokens that are context rather than scored, for [AdaptationMethod::LanguageModeling].
    pub num_conditioning_tokens: Option<usize>,
    /// Choice letter to reference output, for [AdaptationMethod::MultipleChoiceJoint].
    pub output_mapping: Option<BTreeMap<String, String>>,
}

/// Result of an adaptation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub adapter_spec: AdapterSpec,
    /// The eval instances that were adapted.
    pub instances: Vec<Instance>,
    pub request_states: Vec<RequestState>,
}

impl ScenarioState {
    /// Request states of one trial, in emission order.
    pub fn trial(&self, train_trial_index: usize) -> impl Iterator<Item=&RequestState> {
        self.request_states.iter().filter(move |state| state.train_trial_index == train_trial_index)
    }
}

/// Builds requests for a scenario with a fixed [AdapterSpec] and [Tokenizer].
#[derive(Debug, Clone)]
pub struct Adapter<T> {
    spec: AdapterSpec,
    tokenizer: T,
}

impl<T: Tokenizer> Adapter<T> {
    /// Create an adapter. Rejects specs that are invalid on their own or whose completion budget leaves no room for
    /// a prompt in the tokenizer's request length.
    pub fn new(spec: AdapterSpec, tokenizer: T) -> Result<Self> {
        spec.validate()?;
        let max_request_length = tokenizer.max_request_length();
        if spec.method != AdaptationMethod::LanguageModeling && spec.max_tokens >= max_request_length {
            return Err(InvalidAdapterSpec::new(
                "max_tokens",
                format!("{} leaves no room for a prompt within the request length {}", spec.max_tokens, max_request_length),
            ).into());
        }
        if spec.method == AdaptationMethod::LanguageModeling
            && !(spec.instructions.is_empty() && spec.input_prefix.is_empty() && spec.output_prefix.is_empty()) {
            warn!("Language modeling does not use instructions or prefixes, they will be ignored");
        }
        Ok(Self { spec, tokenizer })
    }

    #[inline]
    pub fn spec(&self) -> &AdapterSpec {
        &self.spec
    }

    #[inline]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Seed of a trial, a stable function of the base seed and the trial index.
    #[inline]
    pub fn trial_seed(&self, train_trial_index: usize) -> u64 {
        self.spec.seed.wrapping_add(train_trial_index as u64)
    }

    /// Sample in-context examples with the configured `max_train_instances`. See [sampling::sample_examples].
    pub fn sample_examples<'a>(&self, all_train_instances: &'a [Instance], seed: u64) -> Vec<&'a Instance> {
        sampling::sample_examples(all_train_instances, self.spec.max_train_instances, seed)
    }

    /// Tokens reserved for the completion when checking that a prompt fits.
    pub(crate) fn completion_budget(&self) -> usize {
        match self.spec.method {
            AdaptationMethod::Generation | AdaptationMethod::MultipleChoiceJoint => self.spec.max_tokens,
            AdaptationMethod::MultipleChoiceSeparate | AdaptationMethod::LanguageModeling => 0,
        }
    }

    /// Adapt all instances. [Split::Train] instances form the in-context example pool, every other instance is
    /// evaluated.
    pub fn adapt(&self, instances: &[Instance]) -> Result<ScenarioState> {
        let (train_instances, mut eval_instances): (Vec<Instance>, Vec<Instance>) = instances
            .iter()
            .cloned()
            .partition(|instance| instance.split == Split::Train);
        if let Some(max_eval_instances) = self.spec.max_eval_instances {
            eval_instances.truncate(max_eval_instances);
        }
        info!("Adapting {} eval instances with {} train instances over {} trials ({:?})",
              eval_instances.len(), train_instances.len(), self.spec.num_train_trials, self.spec.method);

        let mut request_states = Vec::new();
        for train_trial_index in 0..self.spec.num_train_trials {
            let train_examples = match self.spec.method {
                AdaptationMethod::LanguageModeling => Vec::new(),
                _ => self.sample_examples(&train_instances, self.trial_seed(train_trial_index)),
            };
            debug!("Trial {}: sampled {} in-context examples", train_trial_index, train_examples.len());
            for (instance_index, instance) in eval_instances.iter().enumerate() {
                let states = self.adapt_instance(&train_examples, instance, instance_index, train_trial_index)
                    .with_context(|| format!("failed to adapt instance {} in trial {}", instance_index, train_trial_index))?;
                request_states.extend(states);
            }
        }
        info!("Built {} requests", request_states.len());

        Ok(ScenarioState {
            adapter_spec: self.spec.clone(),
            instances: eval_instances,
            request_states,
        })
    }

    fn adapt_instance(&self,
                      train_examples: &[&Instance],
                      instance: &Instance,
                      instance_index: usize,
                      train_trial_index: usize) -> Result<Vec<RequestState>> {
        let state = |request: Request| RequestState {
            instance_index,
            train_trial_index,
            reference_index: None,
            request,
            num_train_instances: train_examples.len(),
            num_conditioning_tokens: None,
            output_mapping: None,
        };
        match self.spec.method {
            AdaptationMethod::Generation => {
                let prompt = self.construct_prompt(train_examples, instance, false, None)?;
                Ok(vec![state(self.generation_request(prompt))])
            }
            AdaptationMethod::MultipleChoiceJoint => {
                let prompt = self.construct_prompt(train_examples, instance, false, None)?;
                let output_mapping = instance.references
                    .iter()
                    .enumerate()
                    .map(|(reference_index, reference)| (self.choice_label(reference_index), reference.output.clone()))
                    .collect();
                Ok(vec![RequestState {
                    output_mapping: Some(output_mapping),
                    ..state(self.generation_request(prompt))
                }])
            }
            AdaptationMethod::MultipleChoiceSeparate => (0..instance.references.len())
                .map(|reference_index| -> Result<RequestState> {
                    let prompt = self.construct_prompt(train_examples, instance, true, Some(reference_index))?;
                    Ok(RequestState {
                        reference_index: Some(reference_index),
                        ..state(self.scoring_request(prompt))
                    })
                })
                .collect(),
            AdaptationMethod::LanguageModeling => {
                let conditioning_tokens: Vec<Token> = self.tokenizer.end_of_text_token().into_iter().collect();
                let pred_tokens = self.tokenizer.encode(&instance.input)?;
                let (prompt, num_conditioning_tokens) = self.construct_language_modeling_prompt(
                    &conditioning_tokens,
                    &pred_tokens,
                    self.tokenizer.max_request_length(),
                    &instance.input,
                )?;
                Ok(vec![RequestState {
                    num_conditioning_tokens: Some(num_conditioning_tokens),
                    ..state(self.scoring_request(prompt))
                }])
            }
        }
    }

    fn generation_request(&self, prompt: String) -> Request {
        Request {
            model: self.spec.model.clone(),
            prompt,
            num_completions: self.spec.num_outputs,
            temperature: self.spec.temperature,
            max_tokens: self.spec.max_tokens,
            stop_sequences: self.spec.stop_sequences.clone(),
            echo_prompt: false,
        }
    }

    /// A request that only scores the prompt.
    fn scoring_request(&self, prompt: String) -> Request {
        Request {
            model: self.spec.model.clone(),
            prompt,
            num_completions: 1,
            temperature: 0.0,
            max_tokens: 0,
            stop_sequences: Vec::new(),
            echo_prompt: true,
        }
    }
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;

    /// Error when an [AdapterSpec](crate::adapter::AdapterSpec) is rejected.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct InvalidAdapterSpec {
        pub field: &'static str,
        pub reason: String,
    }

    impl InvalidAdapterSpec {
        pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
            Self {
                field,
                reason: reason.into(),
            }
        }
    }

    impl fmt::Display for InvalidAdapterSpec {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "InvalidAdapterSpec: {} {}", self.field, self.reason)
        }
    }

    impl Error for InvalidAdapterSpec {}

    /// Error when a prompt cannot fit the context window even without in-context examples and with its input
    /// truncated as far as possible.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UnfittablePrompt {
        /// Tokens the irreducible part of the prompt takes: the templates, or the conditioning tokens.
        pub required_tokens: usize,
        /// Tokens reserved for the completion.
        pub reserved_tokens: usize,
        pub max_request_length: usize,
    }

    impl fmt::Display for UnfittablePrompt {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "UnfittablePrompt: {} prompt tokens plus {} completion tokens exceed the request length {}",
                   self.required_tokens, self.reserved_tokens, self.max_request_length)
        }
    }

    impl Error for UnfittablePrompt {}
}
