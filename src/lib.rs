//! RocketQA-style feature generation and pooled inference
//!
//! This crate turns raw query/passage text into the numeric inputs of a
//! BERT/ERNIE encoder and manages concurrent access to the inference engine:
//!
//! - [`tokenizer`]: WordPiece tokenization with CJK and punctuation isolation
//! - [`generator`]: truncation, `[CLS]`/`[SEP]` assembly, segment and position ids, padding
//! - [`pool`]: a fixed, eagerly pre-warmed pool of non-thread-safe predictor handles
//! - [`matrix`]: output reshaping, whole-matrix and per-row L2 normalization
//! - [`encoder`]: dual (two-tower) and cross encoders wiring it all together
//!
//! The inference engine itself stays behind the [`Predictor`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use rocketqa::{DualEncoder, EncoderConfig, Predictor, Result, Tensor};
//!
//! struct Engine {
//!     names: Vec<String>,
//! }
//!
//! impl Predictor for Engine {
//!     type Config = String;
//!
//!     fn create(_model_dir: &String) -> Result<Self> {
//!         Ok(Engine { names: Vec::new() })
//!     }
//!
//!     fn try_clone(&self) -> Result<Self> {
//!         Ok(Engine { names: self.names.clone() })
//!     }
//!
//!     fn input_names(&self) -> &[String] {
//!         &self.names
//!     }
//!
//!     fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
//!         Ok(inputs)
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let config = EncoderConfig::new("zh_vocab.txt").for_cn(true).pool_size(4);
//! let encoder = DualEncoder::<Engine>::new(&config, &"zh_dureader_de".to_string())?;
//!
//! let queries = encoder.encode_query(&["你好，世界！"]).await?;
//! let unit = queries[0].norm();
//! println!("{:?}", unit.to_f64());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_must_use)]

pub mod config;
pub mod encoder;
pub mod error;
pub mod generator;
pub mod matrix;
pub mod pool;
pub mod predictor;
pub mod qpt;
pub mod tensor;
pub mod token;
pub mod tokenizer;
pub mod vocab;

pub use config::EncoderConfig;
pub use encoder::{CrossEncoder, DualEncoder};
pub use error::{Result, RocketQaError};
pub use generator::{
    pad_sequences, truncate_pair, DualRecord, Example, Generator, GeneratorConfig, PaddedBatch,
    Record,
};
pub use matrix::{f32_to_f64, f64_to_f32, Matrix, Vector};
pub use pool::{PoolStats, PooledPredictor, PredictorPool};
pub use predictor::Predictor;
pub use qpt::{Qpt, Qpts};
pub use tensor::{Tensor, TensorData};
pub use token::TokenId;
pub use tokenizer::{Tokenizer, WordpieceTokenizer};
pub use vocab::Vocabulary;
