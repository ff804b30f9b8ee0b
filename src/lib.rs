//! # promptfit
//!
//! Few-shot prompt adaptation for LLM benchmarks: turn evaluation items into requests that fit a model's context
//! window.
//!
//! ## Usage
//! ```toml
//! promptfit = { git = "https://github.com/ifsheldon/promptfit.git", branch = "main"}
//! ```
//!
//! ```no_run
//! use promptfit::adapter::{AdaptationMethod, Adapter, AdapterSpec};
//! use promptfit::scenario::{Instance, Reference, Split};
//! use promptfit::utils::token::tiktoken::Tiktoken;
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = AdapterSpec::new(AdaptationMethod::Generation).with_prefixes("Q: ", "\nA: ");
//! let adapter = Adapter::new(spec, Tiktoken::new("openai/davinci")?)?;
//! let instances = vec![
//!     Instance::new("1 + 1", vec![Reference::correct("2")]).with_split(Split::Train),
//!     Instance::new("2 + 2", vec![Reference::correct("4")]),
//! ];
//! let scenario_state = adapter.adapt(&instances)?;
//! assert_eq!("Q: 1 + 1\nA: 2\n\nQ: 2 + 2\nA: ", scenario_state.request_states[0].request.prompt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concepts and Design
//!
//! ### Scenario
//! A scenario is a list of [Instance](crate::scenario::Instance)s, each an input with candidate outputs called
//! references. References tagged `"correct"` are ground truth. [Split::Train](crate::scenario::Split::Train)
//! instances are the pool of in-context examples, every other instance is evaluated. Where the instances come from is
//! up to you.
//!
//! ### Adapter
//! The [Adapter](crate::adapter::Adapter) owns an [AdapterSpec](crate::adapter::AdapterSpec) and a
//! [Tokenizer](crate::utils::token::Tokenizer). For each trial it samples in-context examples once, then builds one
//! or more [RequestState](crate::adapter::RequestState)s per eval instance. The output is deterministic: same spec,
//! instances and seed, same requests.
//!
//! ### Fitting the context window
//! A prompt that is too long loses in-context examples from the back, then the eval input is cut token-wise. The eval
//! block always stays last and keeps its templates. If even that does not fit, the adapter stops with an error rather
//! than emit a request the model would reject.
//!
//! For language modeling there are no templates; the token sequence is cut from the end of the scored part, never the
//! conditioning part.
//!
//! ### Tokenizer
//! Anything implementing [Tokenizer](crate::utils::token::Tokenizer). [Tiktoken](crate::utils::token::tiktoken::Tiktoken)
//! covers the OpenAI vocabularies.
//!
//! ## Logging
//! `promptfit` logs through the [`log`](https://docs.rs/log) facade and never installs a logger.
//!
//! ## License
//!
//! `promptfit` will always remain free under Apache license.
//!
//! ## Attribution
//! * `tiktoken-rs`: In [crate::utils::token::tiktoken], we re-export `CoreBPE` from the `tiktoken-rs` crate.


pub mod scenario;
pub mod adapter;
pub mod utils;
