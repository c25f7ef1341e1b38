//! Vocabulary loading and token/id lookup
//!
//! A vocabulary file is UTF-8 text with one token per line and no header.
//! The zero-based line number of a token is its id. The vocabulary is built
//! once at startup and is read-only afterwards, so a single instance can be
//! shared behind an `Arc` by any number of concurrent tokenizers.
//!
//! ## Duplicate lines
//!
//! A token that appears on more than one line keeps the id of its first
//! occurrence; later lines are ignored for the forward lookup. The line still
//! occupies its id, so `token(id)` resolves every id in `[0, len)`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, RocketQaError};
use crate::token::TokenId;

/// Immutable mapping between token strings and dense integer ids.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Forward lookup; the first occurrence of a token wins.
    ids: HashMap<String, TokenId>,
    /// Inverse lookup, indexed by id (one entry per line).
    tokens: Vec<String>,
}

impl Vocabulary {
    /// Load a vocabulary from a file, one token per line.
    ///
    /// # Errors
    ///
    /// Returns [`RocketQaError::Io`] if the file cannot be opened or read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| RocketQaError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let vocab = Self::from_reader(BufReader::new(file)).map_err(io_err)?;

        info!(
            path = %path.display(),
            size = vocab.len(),
            duplicates = vocab.duplicate_count(),
            "loaded vocabulary"
        );
        Ok(vocab)
    }

    /// Read a vocabulary from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut vocab = Self::default();
        for line in reader.lines() {
            vocab.push(line?);
        }
        Ok(vocab)
    }

    /// Build a vocabulary from an in-memory token list; index = id.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for token in tokens {
            vocab.push(token.into());
        }
        vocab
    }

    fn push(&mut self, token: String) {
        let id = self.tokens.len() as TokenId;
        if self.ids.contains_key(&token) {
            debug!(token = %token, line = id, "ignoring duplicate vocabulary entry");
        } else {
            self.ids.insert(token.clone(), id);
        }
        self.tokens.push(token);
    }

    /// Number of lines (ids) in the vocabulary.
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of lines whose token had already been seen on an earlier line.
    pub fn duplicate_count(&self) -> usize {
        self.tokens.len() - self.ids.len()
    }

    /// Look up the id of a token. Unknown tokens yield `None`.
    #[inline]
    pub fn get(&self, token: &str) -> Option<TokenId> {
        self.ids.get(token).copied()
    }

    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    /// Look up the token at an id. Out-of-range ids yield `None`.
    #[inline]
    pub fn token(&self, id: TokenId) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.tokens.get(i))
            .map(String::as_str)
    }

    /// Map tokens to ids.
    ///
    /// Tokens missing from the vocabulary are dropped, not replaced with the
    /// `[UNK]` id. The tokenizer already substitutes `[UNK]` for unsplittable
    /// words, so only tokens that never came from it can be missing here.
    pub fn tokens_to_ids<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<TokenId> {
        tokens
            .iter()
            .filter_map(|t| self.get(t.as_ref()))
            .collect()
    }

    /// Map ids back to tokens, dropping ids outside the vocabulary.
    pub fn ids_to_tokens(&self, ids: &[TokenId]) -> Vec<String> {
        ids.iter()
            .filter_map(|&id| self.token(id))
            .map(str::to_string)
            .collect()
    }
}
