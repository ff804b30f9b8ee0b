//! # Language modeling prompts
//!
//! For pure language modeling there are no templates: a request is a token sequence split into conditioning tokens
//! (context, not scored) and prediction tokens (scored). Only the prediction is ever shortened to fit the window.

use anyhow::Result;
use log::debug;

use crate::adapter::errors::UnfittablePrompt;
use crate::adapter::Adapter;
use crate::utils::token::{Token, Tokenizer};

impl<T: Tokenizer> Adapter<T> {
    /// Remove tokens from the tail of `pred_tokens` until conditioning plus prediction is at most `max_req_len`
    /// tokens. Returns the decoded prompt and the kept prediction tokens.
    ///
    /// `text` is the source the tokens were encoded from, see [Tokenizer::decode_with_source].
    pub fn fits_tokens_within_context_window(&self,
                                             conditioning_tokens: &[Token],
                                             pred_tokens: &[Token],
                                             max_req_len: usize,
                                             text: &str) -> Result<(String, Vec<Token>)> {
        if conditioning_tokens.len() > max_req_len {
            return Err(UnfittablePrompt {
                required_tokens: conditioning_tokens.len(),
                reserved_tokens: 0,
                max_request_length: max_req_len,
            }.into());
        }
        let num_pred_tokens = pred_tokens.len().min(max_req_len - conditioning_tokens.len());
        if num_pred_tokens < pred_tokens.len() {
            debug!("Dropped {} trailing prediction tokens to fit {} tokens", pred_tokens.len() - num_pred_tokens, max_req_len);
        }
        let pred_tokens = pred_tokens[..num_pred_tokens].to_vec();

        let mut tokens = Vec::with_capacity(conditioning_tokens.len() + pred_tokens.len());
        tokens.extend_from_slice(conditioning_tokens);
        tokens.extend_from_slice(&pred_tokens);
        let prompt = self.tokenizer().decode_with_source(&tokens, text)?;
        Ok((prompt, pred_tokens))
    }

    /// Build a language modeling prompt and the number of its leading tokens that are conditioning.
    ///
    /// Tokens cut in the middle of a character at either end of the sequence decode to U+FFFD only. The tokens the
    /// tokenizer reports as partial ([Tokenizer::leading_partial_tokens], [Tokenizer::trailing_partial_tokens]) are
    /// left out of the prompt, and the leading ones no longer count as conditioning. U+FFFD that is part of the text
    /// is kept.
    pub fn construct_language_modeling_prompt(&self,
                                              conditioning_tokens: &[Token],
                                              pred_tokens: &[Token],
                                              max_req_len: usize,
                                              text: &str) -> Result<(String, usize)> {
        let (_, pred_tokens) = self.fits_tokens_within_context_window(conditioning_tokens, pred_tokens, max_req_len, text)?;
        let tokens = [conditioning_tokens, pred_tokens.as_slice()].concat();
        let tokenizer = self.tokenizer();
        let leading = tokenizer.leading_partial_tokens(&tokens)?;
        let trailing = tokenizer.trailing_partial_tokens(&tokens[leading..])?;
        if leading + trailing > 0 {
            debug!("Stripped {} leading and {} trailing partial tokens", leading, trailing);
        }
        let prompt = tokenizer.decode_with_source(&tokens[leading..tokens.len() - trailing], text)?;
        Ok((prompt, conditioning_tokens.len() - leading.min(conditioning_tokens.len())))
    }
}
