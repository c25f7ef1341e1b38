//! Dual (two-tower) and cross encoders
//!
//! Both glue the same pieces together: generate records, pad the batch into
//! `[batch, seq_len, 1]` tensors, run a pooled predictor and read the output
//! matrix.
//!
//! | encoder | inputs                          | output read                   |
//! |---------|---------------------------------|-------------------------------|
//! | dual    | query ids/types/pos/mask, then  | 0 = query reps, 1 = para reps |
//! |         | para ids/types/pos/mask         |                               |
//! | cross   | ids/types/pos/mask              | 0 as `[batch, 2]`, column 1   |

use tracing::debug;

use crate::config::EncoderConfig;
use crate::error::{Result, RocketQaError};
use crate::generator::{DualRecord, Example, Generator, PaddedBatch, Record};
use crate::matrix::{Matrix, Vector};
use crate::pool::PredictorPool;
use crate::predictor::{take_output, Predictor};
use crate::qpt::Qpt;
use crate::tensor::Tensor;

const QUERY_OUTPUT: usize = 0;
const PARA_OUTPUT: usize = 1;
const SCORE_OUTPUT: usize = 0;
/// Column of the relevance probability in the cross encoder output.
const POSITIVE_COLUMN: usize = 1;

/// Encodes queries and passages independently into comparable vectors.
#[derive(Debug)]
pub struct DualEncoder<P: Predictor> {
    generator: Generator,
    pool: PredictorPool<P>,
}

impl<P: Predictor> DualEncoder<P> {
    /// Load the vocabulary and pre-warm `config.pool_size` predictors.
    pub fn new(config: &EncoderConfig, predictor_config: &P::Config) -> Result<Self> {
        let generator = config.build_generator()?;
        let pool = PredictorPool::new(predictor_config, config.pool_size)?;
        Ok(Self::from_parts(generator, pool))
    }

    pub fn from_parts(generator: Generator, pool: PredictorPool<P>) -> Self {
        Self { generator, pool }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn pool(&self) -> &PredictorPool<P> {
        &self.pool
    }

    /// One embedding per query, in input order. Returned rows are not normalized.
    pub async fn encode_query(&self, queries: &[&str]) -> Result<Vec<Vector>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = queries.len(), "encoding queries");

        let examples: Vec<Example> = queries.iter().map(|q| Example::from_query(*q)).collect();
        self.encode(&examples, QUERY_OUTPUT).await
    }

    /// One embedding per passage, in input order.
    ///
    /// `titles` must be empty (no titles) or as long as `paras`.
    ///
    /// # Errors
    ///
    /// [`RocketQaError::InvalidInput`] when the title and para counts differ.
    pub async fn encode_para(&self, paras: &[&str], titles: &[&str]) -> Result<Vec<Vector>> {
        if paras.is_empty() {
            return Ok(Vec::new());
        }
        if !titles.is_empty() && titles.len() != paras.len() {
            return Err(RocketQaError::InvalidInput(format!(
                "got {} titles for {} paras",
                titles.len(),
                paras.len()
            )));
        }
        debug!(batch = paras.len(), "encoding paras");

        let examples: Vec<Example> = paras
            .iter()
            .enumerate()
            .map(|(i, para)| Example::from_para(*para, titles.get(i).copied().unwrap_or("")))
            .collect();
        self.encode(&examples, PARA_OUTPUT).await
    }

    async fn encode(&self, examples: &[Example], output: usize) -> Result<Vec<Vector>> {
        let records = self.generator.generate_dual_batch(examples);
        let inputs = dual_inputs(&self.generator, &records)?;

        let outputs = self.pool.infer(inputs).await?;
        let matrix = Matrix::from_tensor(&take_output(outputs, output)?)?;
        check_rows(&matrix, examples.len())?;
        Ok(matrix.rows())
    }
}

/// Scores query/passage relevance by encoding both jointly.
#[derive(Debug)]
pub struct CrossEncoder<P: Predictor> {
    generator: Generator,
    pool: PredictorPool<P>,
}

impl<P: Predictor> CrossEncoder<P> {
    pub fn new(config: &EncoderConfig, predictor_config: &P::Config) -> Result<Self> {
        let generator = config.build_generator()?;
        let pool = PredictorPool::new(predictor_config, config.pool_size)?;
        Ok(Self::from_parts(generator, pool))
    }

    pub fn from_parts(generator: Generator, pool: PredictorPool<P>) -> Self {
        Self { generator, pool }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn pool(&self) -> &PredictorPool<P> {
        &self.pool
    }

    /// Relevance probability of `para` (with `title`) for `query`.
    pub async fn rank(&self, query: &str, para: &str, title: &str) -> Result<f32> {
        let scores = self.rank_batch(&[Qpt::new(query, para, title)]).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| RocketQaError::Predictor("engine returned no score".to_string()))
    }

    /// One relevance probability per triple, in input order.
    pub async fn rank_batch(&self, qpts: &[Qpt]) -> Result<Vec<f32>> {
        if qpts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = qpts.len(), "ranking");

        let examples: Vec<Example> = qpts.iter().map(Example::from).collect();
        let records = self.generator.generate_cross_batch(&examples);
        let refs: Vec<&Record> = records.iter().collect();
        let inputs = record_tensors(&self.generator.pad_records(&refs))?;

        let outputs = self.pool.infer(inputs).await?;
        let matrix = Matrix::from_tensor(&take_output(outputs, SCORE_OUTPUT)?)?;
        check_rows(&matrix, qpts.len())?;
        matrix
            .col(POSITIVE_COLUMN)
            .ok_or_else(|| RocketQaError::ShapeMismatch {
                expected: format!("[{}, 2]", qpts.len()),
                actual: vec![matrix.num_rows(), matrix.num_cols()],
            })
    }
}

/// The eight dual-encoder inputs: the query block, then the para block.
fn dual_inputs(generator: &Generator, records: &[DualRecord]) -> Result<Vec<Tensor>> {
    let queries: Vec<&Record> = records.iter().map(|r| &r.query).collect();
    let paras: Vec<&Record> = records.iter().map(|r| &r.para).collect();

    let mut inputs = record_tensors(&generator.pad_records(&queries))?;
    inputs.extend(record_tensors(&generator.pad_records(&paras))?);
    Ok(inputs)
}

fn record_tensors(batch: &PaddedBatch) -> Result<Vec<Tensor>> {
    Ok(vec![
        Tensor::from_batch_i64(&batch.token_ids)?,
        Tensor::from_batch_i64(&batch.segment_ids)?,
        Tensor::from_batch_i64(&batch.position_ids)?,
        Tensor::from_batch_f32(&batch.attention_mask)?,
    ])
}

fn check_rows(matrix: &Matrix, batch: usize) -> Result<()> {
    if matrix.num_rows() != batch {
        return Err(RocketQaError::ShapeMismatch {
            expected: format!("{batch} rows"),
            actual: vec![matrix.num_rows(), matrix.num_cols()],
        });
    }
    Ok(())
}
