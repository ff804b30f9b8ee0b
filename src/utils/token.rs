//! Tokenizer traits and utilities
//!
//! The adapter never looks inside a tokenizer. Everything it needs (encoding, decoding, the request length limit and
//! the window-fit check) goes through [Tokenizer], so a remote or cached tokenizer can be plugged in just like the
//! bundled [tiktoken::Tiktoken].

use anyhow::Result;

pub mod tiktoken;

/// A token id.
pub type Token = usize;

/// The character lossy decoding substitutes for bytes that do not form a complete UTF-8 sequence.
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Trait for tokenizers the adapter can fit prompts with.
///
/// Implementors provide [encode](Tokenizer::encode), [decode](Tokenizer::decode) and
/// [max_request_length](Tokenizer::max_request_length). The rest are provided in terms of those three and can be
/// overridden when a tokenizer knows better, e.g. a remote service with a native truncation endpoint.
pub trait Tokenizer {
    /// Encode a string into tokens.
    fn encode(&self, text: &str) -> Result<Vec<Token>>;

    /// Decode tokens into a string. Bytes that do not form complete characters should decode to [REPLACEMENT_CHAR]
    /// instead of failing.
    fn decode(&self, tokens: &[Token]) -> Result<String>;

    /// Maximum number of tokens (prompt plus completion) the target model accepts in one request.
    fn max_request_length(&self) -> usize;

    /// Token marking the start of a document, used as conditioning context for language modeling.
    fn end_of_text_token(&self) -> Option<Token> {
        None
    }

    /// Decode tokens that were produced by encoding `source`.
    /// Tokenizers that decode through character offsets into the source text override this.
    fn decode_with_source(&self, tokens: &[Token], _source: &str) -> Result<String> {
        self.decode(tokens)
    }

    /// Count the number of tokens in a string.
    fn count_tokens(&self, text: &str) -> Result<usize> {
        self.encode(text).map(|tokens| tokens.len())
    }

    /// Whether `text` leaves room for `expected_completion_length` generated tokens within the request length.
    fn fits_within_context_window(&self, text: &str, expected_completion_length: usize) -> Result<bool> {
        let prompt_length = self.count_tokens(text)?;
        Ok(prompt_length + expected_completion_length <= self.max_request_length())
    }

    /// Number of leading tokens that do not contribute any well-formed character on their own.
    ///
    /// Byte-level tokenizers can split a multi-byte character across tokens, and the leading ones then decode to
    /// [REPLACEMENT_CHAR] only. The default counts tokens from the front while their cumulative decoding consists of
    /// nothing but replacement characters.
    fn leading_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        for end in 1..=tokens.len() {
            let decoded = self.decode(&tokens[..end])?;
            if decoded.chars().any(|c| c != REPLACEMENT_CHAR) {
                return Ok(end - 1);
            }
        }
        Ok(tokens.len())
    }

    /// Number of trailing tokens that do not contribute any well-formed character on their own, the counterpart of
    /// [leading_partial_tokens](Tokenizer::leading_partial_tokens) for the end of the sequence.
    fn trailing_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        for count in 1..=tokens.len() {
            let decoded = self.decode(&tokens[tokens.len() - count..])?;
            if decoded.chars().any(|c| c != REPLACEMENT_CHAR) {
                return Ok(count - 1);
            }
        }
        Ok(tokens.len())
    }
}

impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn encode(&self, text: &str) -> Result<Vec<Token>> {
        (**self).encode(text)
    }

    fn decode(&self, tokens: &[Token]) -> Result<String> {
        (**self).decode(tokens)
    }

    fn max_request_length(&self) -> usize {
        (**self).max_request_length()
    }

    fn end_of_text_token(&self) -> Option<Token> {
        (**self).end_of_text_token()
    }

    fn decode_with_source(&self, tokens: &[Token], source: &str) -> Result<String> {
        (**self).decode_with_source(tokens, source)
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        (**self).count_tokens(text)
    }

    fn fits_within_context_window(&self, text: &str, expected_completion_length: usize) -> Result<bool> {
        (**self).fits_within_context_window(text, expected_completion_length)
    }

    fn leading_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        (**self).leading_partial_tokens(tokens)
    }

    fn trailing_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        (**self).trailing_partial_tokens(tokens)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::{anyhow, Result};

    use super::{Token, Tokenizer};

    /// One token per `char`, so budgets in tests are exact character counts.
    #[derive(Debug, Clone)]
    pub(crate) struct CharTokenizer {
        pub max_request_length: usize,
    }

    impl CharTokenizer {
        pub(crate) fn new(max_request_length: usize) -> Self {
            Self { max_request_length }
        }
    }

    impl Tokenizer for CharTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<Token>> {
            Ok(text.chars().map(|c| c as Token).collect())
        }

        fn decode(&self, tokens: &[Token]) -> Result<String> {
            tokens
                .iter()
                .map(|&t| {
                    u32::try_from(t)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| anyhow!("token {} is not a char", t))
                })
                .collect()
        }

        fn max_request_length(&self) -> usize {
            self.max_request_length
        }

        // every token is a whole char
        fn leading_partial_tokens(&self, _tokens: &[Token]) -> Result<usize> {
            Ok(0)
        }

        fn trailing_partial_tokens(&self, _tokens: &[Token]) -> Result<usize> {
            Ok(0)
        }
    }

    /// A tokenizer whose every call fails, for checking that errors propagate untouched.
    pub(crate) struct BrokenTokenizer;

    #[derive(Debug)]
    pub(crate) struct TokenizerDown;

    impl std::fmt::Display for TokenizerDown {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "tokenizer service is down")
        }
    }

    impl std::error::Error for TokenizerDown {}

    impl Tokenizer for BrokenTokenizer {
        fn encode(&self, _text: &str) -> Result<Vec<Token>> {
            Err(TokenizerDown.into())
        }

        fn decode(&self, _tokens: &[Token]) -> Result<String> {
            Err(TokenizerDown.into())
        }

        fn max_request_length(&self) -> usize {
            2048
        }
    }
}
