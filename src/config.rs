//! Encoder configuration
//!
//! Loaded from TOML or built in code:
//!
//! ```toml
//! vocab_file = "models/zh_vocab.txt"
//! do_lower_case = true
//! query_max_seq_length = 32
//! para_max_seq_length = 384
//! for_cn = true
//! pool_size = 0   # one predictor per CPU
//! ```
//!
//! Every field except `vocab_file` has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RocketQaError};
use crate::generator::{Generator, GeneratorConfig};
use crate::pool::resolve_pool_size;
use crate::tokenizer::Tokenizer;

/// Settings shared by the dual and cross encoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub vocab_file: PathBuf,
    pub do_lower_case: bool,
    /// Joint sequence limit (cross encoder).
    pub max_seq_length: usize,
    /// Query tower limit (dual encoder).
    pub query_max_seq_length: usize,
    /// Passage tower limit (dual encoder).
    pub para_max_seq_length: usize,
    pub for_cn: bool,
    /// Number of pooled predictors; 0 means one per CPU.
    pub pool_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        let limits = GeneratorConfig::default();
        Self {
            vocab_file: PathBuf::new(),
            do_lower_case: true,
            max_seq_length: limits.max_seq_length,
            query_max_seq_length: limits.query_max_seq_length,
            para_max_seq_length: limits.para_max_seq_length,
            for_cn: limits.for_cn,
            pool_size: 0,
        }
    }
}

impl EncoderConfig {
    pub fn new(vocab_file: impl Into<PathBuf>) -> Self {
        Self {
            vocab_file: vocab_file.into(),
            ..Self::default()
        }
    }

    pub fn do_lower_case(mut self, lower: bool) -> Self {
        self.do_lower_case = lower;
        self
    }

    pub fn max_seq_length(mut self, len: usize) -> Self {
        self.max_seq_length = len;
        self
    }

    pub fn query_max_seq_length(mut self, len: usize) -> Self {
        self.query_max_seq_length = len;
        self
    }

    pub fn para_max_seq_length(mut self, len: usize) -> Self {
        self.para_max_seq_length = len;
        self
    }

    pub fn for_cn(mut self, for_cn: bool) -> Self {
        self.for_cn = for_cn;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RocketQaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded encoder config");
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocab_file.as_os_str().is_empty() {
            return Err(RocketQaError::Config("vocab_file is required".to_string()));
        }
        self.generator_config().validate()
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            max_seq_length: self.max_seq_length,
            query_max_seq_length: self.query_max_seq_length,
            para_max_seq_length: self.para_max_seq_length,
            for_cn: self.for_cn,
        }
    }

    /// The effective pool size after applying the per-CPU default.
    pub fn resolved_pool_size(&self) -> usize {
        resolve_pool_size(self.pool_size)
    }

    /// Load the vocabulary and build a validated generator.
    pub fn build_generator(&self) -> Result<Generator> {
        self.validate()?;
        let tokenizer = Tokenizer::from_file(&self.vocab_file, self.do_lower_case)?;
        Generator::new(tokenizer, self.generator_config())
    }
}
