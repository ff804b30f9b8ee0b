//! # Prompt construction
//!
//! A prompt is made of blocks joined by the instance separator: the instructions (if any), one block per in-context
//! example and finally the eval block. A block is
//!
//! ```text
//! {input_prefix}{input}[choices]{output_prefix}[output]
//! ```
//!
//! where the choices are only listed for joint multiple choice, and the output is rendered for in-context examples
//! always and for the eval block only when asked to.
//!
//! ## Fitting the window
//! While the prompt does not fit, the last in-context example is dropped. With no example left, the eval input is cut
//! to the tokens that remain after the templates and the completion budget. That makes at most one step per
//! in-context example plus the final one that renders the eval block alone. The eval block always closes the prompt
//! and its templates are never cut.

use std::borrow::Borrow;

use anyhow::{bail, Result};
use log::{debug, warn};

use crate::adapter::errors::UnfittablePrompt;
use crate::adapter::{AdaptationMethod, Adapter};
use crate::scenario::{Instance, Reference};
use crate::utils::token::Tokenizer;

impl<T: Tokenizer> Adapter<T> {
    /// Construct a prompt that fits the context window, dropping in-context examples from the back first and
    /// truncating the eval input last.
    ///
    /// `reference_index` selects the reference rendered as the eval output when `include_output` is set (the first
    /// correct reference otherwise). Returns an [UnfittablePrompt] error when even the templates do not fit.
    pub fn construct_prompt<I: Borrow<Instance>>(&self,
                                                 train_instances: &[I],
                                                 eval_instance: &Instance,
                                                 include_output: bool,
                                                 reference_index: Option<usize>) -> Result<String> {
        if let Some(idx) = reference_index {
            if idx >= eval_instance.references.len() {
                bail!("reference index {} is out of range for an instance with {} references",
                      idx, eval_instance.references.len());
            }
        }
        let completion_budget = self.completion_budget();

        // one step per droppable example, the last step renders none and cuts the eval input if needed
        for num_train_instances in (1..=train_instances.len()).rev() {
            let prompt = self.render_prompt(
                &train_instances[..num_train_instances],
                eval_instance,
                &eval_instance.input,
                include_output,
                reference_index,
            );
            if self.tokenizer().fits_within_context_window(&prompt, completion_budget)? {
                if num_train_instances < train_instances.len() {
                    debug!("Dropped {} of {} in-context examples to fit the context window",
                           train_instances.len() - num_train_instances, train_instances.len());
                }
                return Ok(prompt);
            }
        }
        if !train_instances.is_empty() {
            debug!("Dropped all {} in-context examples to fit the context window", train_instances.len());
        }

        self.construct_prompt_with_truncated_input(eval_instance, include_output, reference_index)
    }

    /// Render one block for `instance`.
    pub fn construct_example_prompt(&self,
                                    instance: &Instance,
                                    include_output: bool,
                                    reference_index: Option<usize>) -> String {
        self.render_block(instance, &instance.input, include_output, reference_index)
    }

    /// Label of the `reference_index`-th choice in joint multiple choice: the letter of the reference prefix
    /// advanced by the index.
    pub(crate) fn choice_label(&self, reference_index: usize) -> String {
        let first = self.spec().reference_prefix.chars().next().unwrap_or('A');
        let letter = u32::try_from(reference_index)
            .ok()
            .and_then(|offset| char::from_u32(first as u32 + offset))
            .unwrap_or(first);
        letter.to_string()
    }

    fn choice_prefix(&self, reference_index: usize) -> String {
        let prefix = &self.spec().reference_prefix;
        let rest: String = prefix.chars().skip(1).collect();
        format!("{}{}", self.choice_label(reference_index), rest)
    }

    fn render_block(&self,
                    instance: &Instance,
                    input: &str,
                    include_output: bool,
                    reference_index: Option<usize>) -> String {
        let spec = self.spec();
        let mut block = format!("{}{}", spec.input_prefix, input);
        let joint = spec.method == AdaptationMethod::MultipleChoiceJoint;
        if joint {
            for (idx, reference) in instance.references.iter().enumerate() {
                block.push('\n');
                block.push_str(&self.choice_prefix(idx));
                block.push_str(&reference.output);
            }
        }
        block.push_str(&spec.output_prefix);
        if include_output {
            let selected = match reference_index {
                Some(idx) => instance.references.get(idx).map(|reference| (idx, reference)),
                None => first_correct(instance),
            };
            if let Some((idx, reference)) = selected {
                if joint {
                    block.push_str(&self.choice_label(idx));
                } else {
                    block.push_str(&reference.output);
                }
            }
        }
        block
    }

    fn render_prompt<I: Borrow<Instance>>(&self,
                                          train_instances: &[I],
                                          eval_instance: &Instance,
                                          eval_input: &str,
                                          include_output: bool,
                                          reference_index: Option<usize>) -> String {
        let spec = self.spec();
        let mut blocks = Vec::with_capacity(train_instances.len() + 2);
        if !spec.instructions.is_empty() {
            blocks.push(spec.instructions.clone());
        }
        for train_instance in train_instances {
            blocks.push(self.construct_example_prompt(train_instance.borrow(), true, None));
        }
        blocks.push(self.render_block(eval_instance, eval_input, include_output, reference_index));
        blocks.join(&spec.instance_separator)
    }

    /// Render the eval block alone, keeping the longest token prefix of the eval input that fits next to the
    /// templates.
    ///
    /// The first cut assumes the input tokens add up with the template tokens. BPE merges across the template/input
    /// boundary can break that, so the cut shrinks by the measured overshoot until the prompt fits. Fails only when
    /// the templates alone do not fit.
    fn construct_prompt_with_truncated_input(&self,
                                             eval_instance: &Instance,
                                             include_output: bool,
                                             reference_index: Option<usize>) -> Result<String> {
        let tokenizer = self.tokenizer();
        let max_request_length = tokenizer.max_request_length();
        let completion_budget = self.completion_budget();
        let render = |input: &str| self.render_prompt::<&Instance>(&[], eval_instance, input, include_output, reference_index);

        let prompt = render(&eval_instance.input);
        if tokenizer.fits_within_context_window(&prompt, completion_budget)? {
            return Ok(prompt);
        }

        let unfittable = |required_tokens: usize| UnfittablePrompt {
            required_tokens,
            reserved_tokens: completion_budget,
            max_request_length,
        };
        let template_tokens = tokenizer.count_tokens(&render(""))?;
        let Some(input_budget) = max_request_length.checked_sub(template_tokens + completion_budget) else {
            return Err(unfittable(template_tokens).into());
        };

        let input_tokens = tokenizer.encode(&eval_instance.input)?;
        let mut kept = input_budget.min(input_tokens.len());
        loop {
            let truncated_input = tokenizer.decode_with_source(&input_tokens[..kept], &eval_instance.input)?;
            let prompt = render(&truncated_input);
            if tokenizer.fits_within_context_window(&prompt, completion_budget)? {
                warn!("Truncated the eval input from {} to {} tokens to fit the context window", input_tokens.len(), kept);
                return Ok(prompt);
            }
            let prompt_tokens = tokenizer.count_tokens(&prompt)?;
            if kept == 0 {
                return Err(unfittable(prompt_tokens).into());
            }
            let overshoot = (prompt_tokens + completion_budget).saturating_sub(max_request_length);
            kept = kept.saturating_sub(overshoot.max(1));
        }
    }
}

fn first_correct(instance: &Instance) -> Option<(usize, &Reference)> {
    instance.references.iter().enumerate().find(|(_, reference)| reference.is_correct())
}
