use std::collections::HashMap;
use anyhow::{bail, Result};
pub use tiktoken_rs::CoreBPE;
use tiktoken_rs::{cl100k_base, p50k_base, r50k_base};
use lazy_static::lazy_static;

use crate::utils::token::{Token, Tokenizer};

/// BPE vocabularies bundled with `tiktoken-rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// GPT-2 / GPT-3 base models
    R50kBase,
    /// Codex and the instruct GPT-3 models
    P50kBase,
    /// Chat models
    Cl100kBase,
}

impl Encoding {
    fn load(self) -> Result<CoreBPE> {
        match self {
            Encoding::R50kBase => r50k_base(),
            Encoding::P50kBase => p50k_base(),
            Encoding::Cl100kBase => cl100k_base(),
        }
    }

    /// The `<|endoftext|>` token of the vocabulary.
    pub fn end_of_text_token(self) -> Token {
        match self {
            Encoding::R50kBase | Encoding::P50kBase => 50256,
            Encoding::Cl100kBase => 100257,
        }
    }
}

/// What the tokenizer needs to know about a model.
#[derive(Debug, Clone, Copy)]
pub struct ModelWindow {
    pub encoding: Encoding,
    /// Prompt plus completion tokens accepted in one request.
    pub max_request_length: usize,
}

lazy_static! {
    /// const map from model name to its encoding and request length limit.
    /// TODO: when `LazyLock` fits our MSRV, use that instead
    pub static ref MODEL_TO_WINDOW: HashMap<&'static str, ModelWindow> = HashMap::from([
        ("openai/davinci", ModelWindow { encoding: Encoding::R50kBase, max_request_length: 2049 }),
        ("openai/curie", ModelWindow { encoding: Encoding::R50kBase, max_request_length: 2049 }),
        ("openai/babbage", ModelWindow { encoding: Encoding::R50kBase, max_request_length: 2049 }),
        ("openai/ada", ModelWindow { encoding: Encoding::R50kBase, max_request_length: 2049 }),
        ("openai/text-davinci-002", ModelWindow { encoding: Encoding::P50kBase, max_request_length: 4001 }),
        ("openai/text-davinci-003", ModelWindow { encoding: Encoding::P50kBase, max_request_length: 4001 }),
        ("openai/code-davinci-002", ModelWindow { encoding: Encoding::P50kBase, max_request_length: 8001 }),
        ("openai/gpt-3.5-turbo", ModelWindow { encoding: Encoding::Cl100kBase, max_request_length: 4096 }),
        ("openai/gpt-3.5-turbo-16k", ModelWindow { encoding: Encoding::Cl100kBase, max_request_length: 16384 }),
        ("openai/gpt-4", ModelWindow { encoding: Encoding::Cl100kBase, max_request_length: 8192 }),
        ("openai/gpt-4-32k", ModelWindow { encoding: Encoding::Cl100kBase, max_request_length: 32768 }),
    ]);
}

/// Tokenizer using the Tiktoken BPE vocabularies.
#[derive(Clone)]
#[readonly::make]
pub struct Tiktoken {
    /// The model name of the tokenizer. read-only.
    #[readonly]
    pub model: String,
    /// The encoding of the model. read-only.
    #[readonly]
    pub encoding: Encoding,
    /// The tokenizer. read-only.
    #[readonly]
    pub bpe: CoreBPE,
    max_request_length: usize,
}

impl Tiktoken {
    /// Create a tokenizer for one of the models in [MODEL_TO_WINDOW].
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let Some(window) = MODEL_TO_WINDOW.get(model.as_str()).copied() else {
            bail!("model {} is not supported", model)
        };
        Self::with_window(model, window)
    }

    /// Create a tokenizer for any model given its encoding and request length limit.
    pub fn with_window(model: impl Into<String>, window: ModelWindow) -> Result<Self> {
        let bpe = window.encoding.load()?;
        Ok(Tiktoken {
            model: model.into(),
            encoding: window.encoding,
            bpe,
            max_request_length: window.max_request_length,
        })
    }
}

impl Tokenizer for Tiktoken {
    fn encode(&self, text: &str) -> Result<Vec<Token>> {
        Ok(self.bpe.encode_with_special_tokens(text))
    }

    /// Lossy decoding: partial UTF-8 sequences at token boundaries become U+FFFD.
    fn decode(&self, tokens: &[Token]) -> Result<String> {
        let bytes = self.bpe._decode_native(tokens);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn max_request_length(&self) -> usize {
        self.max_request_length
    }

    fn end_of_text_token(&self) -> Option<Token> {
        Some(self.encoding.end_of_text_token())
    }

    // Decided on the raw bytes of the whole sequence, so a U+FFFD that is really in the text is a complete character.
    fn leading_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        let lengths = self.token_byte_lengths(tokens);
        let bytes = self.bpe._decode_native(tokens);
        let invalid = complete_char_span(&bytes).map_or(bytes.len(), |(start, _)| start);
        Ok(count_within(lengths.iter(), invalid))
    }

    fn trailing_partial_tokens(&self, tokens: &[Token]) -> Result<usize> {
        let lengths = self.token_byte_lengths(tokens);
        let bytes = self.bpe._decode_native(tokens);
        let invalid = complete_char_span(&bytes).map_or(bytes.len(), |(_, end)| bytes.len() - end);
        Ok(count_within(lengths.iter().rev(), invalid))
    }
}

impl Tiktoken {
    fn token_byte_lengths(&self, tokens: &[Token]) -> Vec<usize> {
        tokens.iter().map(|&token| self.bpe._decode_native(&[token]).len()).collect()
    }
}

/// Byte range from the start of the first to the end of the last complete UTF-8 character in `bytes`.
fn complete_char_span(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut span: Option<(usize, usize)> = None;
    let mut pos = 0;
    while pos < bytes.len() {
        let (valid, skip) = match std::str::from_utf8(&bytes[pos..]) {
            Ok(text) => (text.len(), 0),
            Err(e) => (e.valid_up_to(), e.error_len().unwrap_or(bytes.len() - pos - e.valid_up_to())),
        };
        if valid > 0 {
            let start = span.map_or(pos, |(start, _)| start);
            span = Some((start, pos + valid));
        }
        pos += valid + skip;
    }
    span
}

/// Number of tokens, in iteration order, whose bytes lie entirely within the first `limit` bytes.
fn count_within<'a>(lengths: impl Iterator<Item = &'a usize>, limit: usize) -> usize {
    let mut total = 0;
    lengths
        .take_while(|&&length| {
            total += length;
            total <= limit
        })
        .count()
}

#[cfg(test)]
mod test_tiktoken {
    use super::{complete_char_span, Tiktoken};
    use crate::utils::token::Tokenizer;

    #[test]
    fn test_unsupported_model() {
        assert!(Tiktoken::new("acme/unknown").is_err());
    }

    #[test]
    fn test_davinci_window() {
        let tokenizer = Tiktoken::new("openai/davinci").unwrap();
        assert_eq!(2049, tokenizer.max_request_length());
        assert_eq!(Some(50256), tokenizer.end_of_text_token());
        assert_eq!(vec![464, 262], tokenizer.encode("The the").unwrap());
        assert_eq!("<|endoftext|>The the", tokenizer.decode(&[50256, 464, 262]).unwrap());
    }

    #[test]
    fn test_round_trip_and_fit() {
        let tokenizer = Tiktoken::new("openai/davinci").unwrap();
        let text = "Excuse me, where is the train station?";
        let tokens = tokenizer.encode(text).unwrap();
        assert_eq!(text, tokenizer.decode(&tokens).unwrap());
        assert!(tokenizer.fits_within_context_window(text, 100).unwrap());
        assert!(!tokenizer.fits_within_context_window(text, 2049).unwrap());
    }

    #[test]
    fn test_complete_char_span() {
        assert_eq!(Some((0, 1)), complete_char_span("a".as_bytes()));
        assert_eq!(Some((0, 3)), complete_char_span("\u{FFFD}".as_bytes()));
        // stray continuation byte, "ab", first two bytes of a three byte character
        assert_eq!(Some((1, 3)), complete_char_span(&[0xA9, b'a', b'b', 0xE2, 0x80]));
        assert_eq!(None, complete_char_span(&[]));
        assert_eq!(None, complete_char_span(&[0xE2, 0x80]));
        assert_eq!(None, complete_char_span(&[0xA9, 0xA9]));
    }

    #[test]
    fn test_replacement_char_in_text_is_not_partial() {
        let tokenizer = Tiktoken::new("openai/davinci").unwrap();
        let tokens = tokenizer.encode("\u{FFFD} ok \u{FFFD}").unwrap();
        assert_eq!(0, tokenizer.leading_partial_tokens(&tokens).unwrap());
        assert_eq!(0, tokenizer.trailing_partial_tokens(&tokens).unwrap());
    }

    #[test]
    fn test_partial_tokens_at_both_ends() {
        let tokenizer = Tiktoken::new("openai/davinci").unwrap();
        // the first and last tokens hold parts of multi-byte characters only
        let tokens: [usize; 5] = [110, 40127, 1904, 502, 447];
        assert_eq!(1, tokenizer.leading_partial_tokens(&tokens).unwrap());
        assert_eq!(1, tokenizer.trailing_partial_tokens(&tokens).unwrap());
    }
}
