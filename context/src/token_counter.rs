//! Token estimation using tiktoken.
//!
//! When `tiktoken-rs` knows the BPE for a model identifier (OpenAI families:
//! `o200k_base`, `cl100k_base`, `p50k_base`, `p50k_edit`, `r50k_base`), the
//! count is exact for that encoding. Every other identifier, including blank
//! or malformed ones and proprietary tokenizers such as Claude or Gemini,
//! falls back to `ceil(chars / 4)`.
//!
//! Encoders are expensive to build (they load vocabulary data), so each
//! encoding is initialized at most once per process and shared read-only.
//! Nothing is held per call.

use std::sync::OnceLock;

use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base, p50k_base, p50k_edit, r50k_base};

use chatmem_types::Message;

/// Characters per token assumed by the fallback estimate.
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

static O200K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();
static P50K_EDIT: OnceLock<Option<CoreBPE>> = OnceLock::new();
static R50K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

type EncoderInit = fn() -> Option<CoreBPE>;

fn init_o200k_base() -> Option<CoreBPE> {
    o200k_base().ok()
}

fn init_cl100k_base() -> Option<CoreBPE> {
    cl100k_base().ok()
}

fn init_p50k_base() -> Option<CoreBPE> {
    p50k_base().ok()
}

fn init_p50k_edit() -> Option<CoreBPE> {
    p50k_edit().ok()
}

fn init_r50k_base() -> Option<CoreBPE> {
    r50k_base().ok()
}

fn encoder_for(model: &str) -> Option<&'static CoreBPE> {
    let model = model.trim();
    if model.is_empty() {
        return None;
    }

    let (cell, init): (&'static OnceLock<Option<CoreBPE>>, EncoderInit) =
        match get_tokenizer(model)? {
            Tokenizer::O200kBase => (&O200K_BASE, init_o200k_base as EncoderInit),
            Tokenizer::Cl100kBase => (&CL100K_BASE, init_cl100k_base as EncoderInit),
            Tokenizer::P50kBase => (&P50K_BASE, init_p50k_base as EncoderInit),
            Tokenizer::P50kEdit => (&P50K_EDIT, init_p50k_edit as EncoderInit),
            Tokenizer::R50kBase | Tokenizer::Gpt2 => (&R50K_BASE, init_r50k_base as EncoderInit),
            #[allow(unreachable_patterns)]
            _ => return None,
        };

    cell.get_or_init(|| {
        let encoder = init();
        if encoder.is_none() {
            tracing::warn!(
                model,
                "Failed to initialize tiktoken encoder. Falling back to length estimates."
            );
        }
        encoder
    })
    .as_ref()
}

/// `ceil(chars / 4)`, counting Unicode scalar values.
#[must_use]
pub fn fallback_estimate(text: &str) -> u32 {
    let tokens = text.chars().count().div_ceil(FALLBACK_CHARS_PER_TOKEN);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

/// Model-aware token estimator.
///
/// Never fails: an identifier without a known tokenizer degrades to the
/// length-based estimate.
///
/// # Example
///
/// ```
/// use chatmem_context::TokenCounter;
///
/// let counter = TokenCounter::new();
/// assert_eq!(counter.estimate("abcdefgh", "claude-sonnet-4"), 2);
/// assert!(counter.estimate("Hello, world!", "gpt-4o") > 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Estimates the tokens `text` occupies for `model`.
    #[must_use]
    pub fn estimate(&self, text: &str, model: &str) -> u32 {
        match encoder_for(model) {
            Some(encoder) => {
                u32::try_from(encoder.encode_ordinary(text).len()).unwrap_or(u32::MAX)
            }
            None => fallback_estimate(text),
        }
    }

    /// True when `model` resolves to an exact tokenizer.
    #[must_use]
    pub fn is_exact(&self, model: &str) -> bool {
        encoder_for(model).is_some()
    }

    /// Estimates one message's content.
    #[must_use]
    pub fn estimate_message(&self, message: &Message, model: &str) -> u32 {
        self.estimate(message.content(), model)
    }

    /// Sum of content estimates across `messages`.
    #[must_use]
    pub fn estimate_messages(&self, messages: &[Message], model: &str) -> u32 {
        messages
            .iter()
            .map(|msg| self.estimate_message(msg, model))
            .fold(0u32, u32::saturating_add)
    }
}
