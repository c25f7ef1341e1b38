//! Feature generation: token sequences to padded numeric records
//!
//! The layout follows the BERT/ERNIE convention:
//!
//! ```text
//! (a) sequence pair:
//!     tokens:      [CLS] is this jack ##son ##ville ? [SEP] no it is not . [SEP]
//!     segment_ids: 0     0  0    0    0     0       0 0     1  1  1  1   1 1
//!
//! (b) single sequence:
//!     tokens:      [CLS] the dog is hairy . [SEP]
//!     segment_ids: 0     0   0   0  0     0 0
//! ```
//!
//! Position ids are the 0-based index within the final sequence. Records are
//! built unpadded; [`Generator::pad`] and [`Generator::pad_records`] right-pad a
//! batch to its longest member and produce the attention mask.

use std::borrow::Cow;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RocketQaError};
use crate::token::{TokenId, CLS_TOKEN, PAD_TOKEN, SEP_TOKEN, UNK_TOKEN};
use crate::tokenizer::Tokenizer;

/// Special tokens added around a single sequence: `[CLS] A [SEP]`.
pub const SINGLE_SPECIAL_TOKENS: usize = 2;
/// Special tokens added around a pair: `[CLS] A [SEP] B [SEP]`.
pub const PAIR_SPECIAL_TOKENS: usize = 3;

/// Placeholder used for the unused fields of single-purpose examples.
const PLACEHOLDER: &str = "-";

/// A logical input unit with three text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub query: String,
    pub title: String,
    pub para: String,
}

impl Example {
    pub fn new(
        query: impl Into<String>,
        title: impl Into<String>,
        para: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            title: title.into(),
            para: para.into(),
        }
    }

    /// An example carrying only a query; title and para are `"-"`.
    pub fn from_query(query: impl Into<String>) -> Self {
        Self::new(query, PLACEHOLDER, PLACEHOLDER)
    }

    /// An example carrying only a passage; the query is `"-"`.
    pub fn from_para(para: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(PLACEHOLDER, title, para)
    }

    /// Strip every whitespace character from all fields.
    pub fn clean(&mut self) {
        for field in [&mut self.query, &mut self.title, &mut self.para] {
            field.retain(|c| !c.is_whitespace());
        }
    }
}

/// Numeric encoding of one sequence.
///
/// All four vectors always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub token_ids: Vec<TokenId>,
    pub segment_ids: Vec<TokenId>,
    pub position_ids: Vec<TokenId>,
    pub attention_mask: Vec<f32>,
}

impl Record {
    #[inline]
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// The two records of a dual (two-tower) encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualRecord {
    pub query: Record,
    pub para: Record,
}

/// A batch of records right-padded to a common length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaddedBatch {
    pub token_ids: Vec<Vec<TokenId>>,
    pub segment_ids: Vec<Vec<TokenId>>,
    pub position_ids: Vec<Vec<TokenId>>,
    pub attention_mask: Vec<Vec<f32>>,
    /// Length of every padded sequence (the longest record in the batch).
    pub seq_len: usize,
}

impl PaddedBatch {
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.token_ids.len()
    }
}

/// Sequence length limits and cleanup mode for a [`Generator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Limit for the joint (cross encoder) sequence.
    pub max_seq_length: usize,
    /// Limit for the query tower of a dual encoder.
    pub query_max_seq_length: usize,
    /// Limit for the passage tower of a dual encoder.
    pub para_max_seq_length: usize,
    /// Strip all whitespace from raw fields before tokenization.
    pub for_cn: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_seq_length: 384,
            query_max_seq_length: 32,
            para_max_seq_length: 384,
            for_cn: false,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
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

    /// Every limit must leave room for the special tokens it wraps.
    pub fn validate(&self) -> Result<()> {
        check_len("max_seq_length", self.max_seq_length, PAIR_SPECIAL_TOKENS)?;
        check_len(
            "query_max_seq_length",
            self.query_max_seq_length,
            SINGLE_SPECIAL_TOKENS,
        )?;
        check_len(
            "para_max_seq_length",
            self.para_max_seq_length,
            PAIR_SPECIAL_TOKENS,
        )?;
        Ok(())
    }
}

fn check_len(name: &str, len: usize, min: usize) -> Result<()> {
    if len < min {
        return Err(RocketQaError::Config(format!(
            "{name} must be at least {min}, got {len}"
        )));
    }
    Ok(())
}

/// Turns examples into records.
///
/// Holds only the tokenizer and validated limits; every call is independent,
/// so one generator can be shared across threads.
#[derive(Debug, Clone)]
pub struct Generator {
    tokenizer: Tokenizer,
    config: GeneratorConfig,
    cls_id: TokenId,
    sep_id: TokenId,
    pad_id: TokenId,
}

impl Generator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Returns [`RocketQaError::Config`] if a limit is too small for its special
    /// tokens, or if the vocabulary lacks `[CLS]`, `[SEP]`, `[PAD]` or `[UNK]`.
    pub fn new(tokenizer: Tokenizer, config: GeneratorConfig) -> Result<Self> {
        config.validate()?;

        let vocab = tokenizer.vocab();
        let required = |token: &str| {
            vocab.get(token).ok_or_else(|| {
                RocketQaError::Config(format!("vocabulary has no {token} token"))
            })
        };
        let cls_id = required(CLS_TOKEN)?;
        let sep_id = required(SEP_TOKEN)?;
        let pad_id = required(PAD_TOKEN)?;
        required(UNK_TOKEN)?;

        Ok(Self {
            tokenizer,
            config,
            cls_id,
            sep_id,
            pad_id,
        })
    }

    #[inline]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    #[inline]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    #[inline]
    pub fn pad_id(&self) -> TokenId {
        self.pad_id
    }

    /// Encode one text as `[CLS] tokens [SEP]`.
    pub fn encode_single(&self, text: &str, max_len: usize) -> Result<Record> {
        check_len("max_len", max_len, SINGLE_SPECIAL_TOKENS)?;
        let tokens = self.tokenize_field(text);
        Ok(self.build(tokens, Vec::new(), max_len))
    }

    /// Encode two texts as `[CLS] a [SEP] b [SEP]`.
    pub fn encode_pair(&self, text_a: &str, text_b: &str, max_len: usize) -> Result<Record> {
        check_len("max_len", max_len, PAIR_SPECIAL_TOKENS)?;
        let tokens_a = self.tokenize_field(text_a);
        let tokens_b = self.tokenize_field(text_b);
        Ok(self.build(tokens_a, tokens_b, max_len))
    }

    /// Dual encoding: the query alone, and the passage as title + para.
    pub fn generate_dual(&self, example: &Example) -> DualRecord {
        let query = self.tokenize_field(&example.query);
        let query = self.build(query, Vec::new(), self.config.query_max_seq_length);

        let title = self.tokenize_field(&example.title);
        let para = self.tokenize_field(&example.para);
        let para = self.build(title, para, self.config.para_max_seq_length);

        DualRecord { query, para }
    }

    /// Cross encoding: the query against the title tokens followed by the para tokens.
    pub fn generate_cross(&self, example: &Example) -> Record {
        let tokens_a = self.tokenize_field(&example.query);
        let mut tokens_b = self.tokenize_field(&example.title);
        tokens_b.extend(self.tokenize_field(&example.para));

        self.build(tokens_a, tokens_b, self.config.max_seq_length)
    }

    /// [`Self::generate_dual`] over a batch, in parallel with the `parallel` feature.
    pub fn generate_dual_batch(&self, examples: &[Example]) -> Vec<DualRecord> {
        #[cfg(feature = "parallel")]
        {
            examples.par_iter().map(|e| self.generate_dual(e)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            examples.iter().map(|e| self.generate_dual(e)).collect()
        }
    }

    /// [`Self::generate_cross`] over a batch, in parallel with the `parallel` feature.
    pub fn generate_cross_batch(&self, examples: &[Example]) -> Vec<Record> {
        #[cfg(feature = "parallel")]
        {
            examples.par_iter().map(|e| self.generate_cross(e)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            examples.iter().map(|e| self.generate_cross(e)).collect()
        }
    }

    /// Right-pad id sequences with the `[PAD]` id; see [`pad_sequences`].
    pub fn pad(&self, batch: &[Vec<TokenId>]) -> (Vec<Vec<TokenId>>, Vec<Vec<f32>>) {
        pad_sequences(batch, self.pad_id)
    }

    /// Pad every field of a batch of records to the longest record.
    pub fn pad_records(&self, records: &[&Record]) -> PaddedBatch {
        let seq_len = records.iter().map(|r| r.len()).max().unwrap_or(0);

        PaddedBatch {
            token_ids: pad_field(records, seq_len, self.pad_id, |r| r.token_ids.as_slice()),
            segment_ids: pad_field(records, seq_len, self.pad_id, |r| r.segment_ids.as_slice()),
            position_ids: pad_field(records, seq_len, self.pad_id, |r| r.position_ids.as_slice()),
            attention_mask: records.iter().map(|r| mask_for(r.len(), seq_len)).collect(),
            seq_len,
        }
    }

    fn tokenize_field(&self, text: &str) -> Vec<String> {
        let text: Cow<'_, str> = if self.config.for_cn {
            Cow::Owned(text.chars().filter(|c| !c.is_whitespace()).collect())
        } else {
            Cow::Borrowed(text)
        };
        self.tokenizer.tokenize(&text)
    }

    /// Truncate and assemble one record.
    ///
    /// `max_len` has already been validated against the special-token count.
    fn build(
        &self,
        mut tokens_a: Vec<String>,
        mut tokens_b: Vec<String>,
        max_len: usize,
    ) -> Record {
        let specials = if tokens_b.is_empty() {
            SINGLE_SPECIAL_TOKENS
        } else {
            PAIR_SPECIAL_TOKENS
        };
        truncate_pair(&mut tokens_a, &mut tokens_b, max_len.saturating_sub(specials));

        let len = tokens_a.len() + tokens_b.len() + PAIR_SPECIAL_TOKENS;
        let mut token_ids = Vec::with_capacity(len);
        let mut segment_ids = Vec::with_capacity(len);

        token_ids.push(self.cls_id);
        token_ids.extend(self.tokenizer.tokens_to_ids(&tokens_a));
        token_ids.push(self.sep_id);
        segment_ids.resize(token_ids.len(), 0);

        if !tokens_b.is_empty() {
            token_ids.extend(self.tokenizer.tokens_to_ids(&tokens_b));
            token_ids.push(self.sep_id);
            segment_ids.resize(token_ids.len(), 1);
        }

        let position_ids = (0..token_ids.len() as TokenId).collect();
        let attention_mask = vec![1.0; token_ids.len()];

        Record {
            token_ids,
            segment_ids,
            position_ids,
            attention_mask,
        }
    }
}

/// Truncate a sequence pair in place until `a.len() + b.len() <= budget`.
///
/// One token is removed at a time from the end of whichever sequence is
/// currently longer; `a` is only shortened when it is strictly longer, so
/// ties shorten `b`.
pub fn truncate_pair<T>(a: &mut Vec<T>, b: &mut Vec<T>, budget: usize) {
    while a.len() + b.len() > budget {
        if a.len() > b.len() {
            a.pop();
        } else {
            b.pop();
        }
    }
}

/// Right-pad sequences to the longest one in the batch.
///
/// Returns the padded sequences and, per sequence, a mask that is `1.0` at
/// original positions and `0.0` at padding.
pub fn pad_sequences(
    batch: &[Vec<TokenId>],
    pad_id: TokenId,
) -> (Vec<Vec<TokenId>>, Vec<Vec<f32>>) {
    let max_len = batch.iter().map(Vec::len).max().unwrap_or(0);

    batch
        .iter()
        .map(|seq| (pad_to(seq, max_len, pad_id), mask_for(seq.len(), max_len)))
        .unzip()
}

fn pad_field<F>(records: &[&Record], len: usize, pad_id: TokenId, field: F) -> Vec<Vec<TokenId>>
where
    F: Fn(&Record) -> &[TokenId],
{
    records
        .iter()
        .map(|&r| pad_to(field(r), len, pad_id))
        .collect()
}

fn pad_to(seq: &[TokenId], len: usize, pad_id: TokenId) -> Vec<TokenId> {
    let mut padded = Vec::with_capacity(len);
    padded.extend_from_slice(seq);
    padded.resize(len, pad_id);
    padded
}

fn mask_for(real: usize, len: usize) -> Vec<f32> {
    let mut mask = vec![1.0; real];
    mask.resize(len, 0.0);
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocabulary;
    use std::sync::Arc;

    // ids: [PAD]=0 [CLS]=1 [SEP]=2 [UNK]=3 ...
    const VOCAB: &[&str] = &[
        "[PAD]", "[CLS]", "[SEP]", "[UNK]", "-", "你", "好", "，", "世", "界", "！", "hello",
        ",", "world", "!", "this", "is", "a", "long", "paragraph", ".", "title",
    ];

    fn make_generator(config: GeneratorConfig) -> Generator {
        let vocab = Arc::new(Vocabulary::from_tokens(VOCAB.iter().copied()));
        Generator::new(Tokenizer::new(vocab, true), config).expect("valid generator")
    }

    fn assert_record_invariants(r: &Record) {
        assert_eq!(r.token_ids.len(), r.segment_ids.len());
        assert_eq!(r.token_ids.len(), r.position_ids.len());
        assert_eq!(r.token_ids.len(), r.attention_mask.len());
        let expected: Vec<TokenId> = (0..r.len() as TokenId).collect();
        assert_eq!(r.position_ids, expected);
        let transitions = r.segment_ids.windows(2).filter(|w| w[0] != w[1]).count();
        assert!(transitions <= 1);
        assert_eq!(r.segment_ids.first(), Some(&0));
    }

    #[test]
    fn test_truncate_longer_side_first() {
        let mut a = vec![1, 2, 3, 4, 5];
        let mut b = vec![6, 7];
        truncate_pair(&mut a, &mut b, 4);
        assert_eq!(a, vec![1, 2]);
        assert_eq!(b, vec![6, 7]);
    }

    #[test]
    fn test_truncate_tie_goes_to_b() {
        let mut a = vec![1, 2, 3];
        let mut b = vec![4, 5, 6];
        truncate_pair(&mut a, &mut b, 5);
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(b, vec![4, 5]);

        // alternating one token at a time, not proportional
        let mut a = vec![1, 2, 3];
        let mut b = vec![4, 5, 6];
        truncate_pair(&mut a, &mut b, 3);
        assert_eq!(a, vec![1, 2]);
        assert_eq!(b, vec![4]);
    }

    #[test]
    fn test_truncate_reaches_budget_exactly() {
        for (la, lb, budget) in [(10, 3, 7), (3, 10, 7), (6, 6, 1), (0, 9, 4), (9, 0, 0)] {
            let mut a: Vec<usize> = (0..la).collect();
            let mut b: Vec<usize> = (0..lb).collect();
            truncate_pair(&mut a, &mut b, budget);
            assert_eq!(a.len() + b.len(), budget);
            // prefixes are kept
            assert!(a.iter().enumerate().all(|(i, &v)| i == v));
            assert!(b.iter().enumerate().all(|(i, &v)| i == v));
        }
    }

    #[test]
    fn test_truncate_noop_within_budget() {
        let mut a = vec![1];
        let mut b = vec![2];
        truncate_pair(&mut a, &mut b, 10);
        assert_eq!((a, b), (vec![1], vec![2]));
    }

    #[test]
    fn test_generate_dual_query() {
        let g = make_generator(GeneratorConfig::default().for_cn(true));
        let data = g.generate_dual(&Example::from_query("你好，世界！"));

        assert_eq!(data.query.token_ids, vec![1, 5, 6, 7, 8, 9, 10, 2]);
        assert_eq!(data.query.segment_ids, vec![0; 8]);
        assert_eq!(data.query.position_ids, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(data.query.attention_mask, vec![1.0; 8]);

        // "-" title against "-" para
        assert_eq!(data.para.token_ids, vec![1, 4, 2, 4, 2]);
        assert_eq!(data.para.segment_ids, vec![0, 0, 0, 1, 1]);
        assert_eq!(data.para.position_ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_generate_dual_para_with_empty_title() {
        let g = make_generator(GeneratorConfig::default());
        let data = g.generate_dual(&Example::from_para("This is a long paragraph.", ""));

        assert_eq!(data.query.token_ids, vec![1, 4, 2]);
        assert_eq!(data.para.token_ids, vec![1, 2, 15, 16, 17, 18, 19, 20, 2]);
        assert_eq!(data.para.segment_ids, vec![0, 0, 1, 1, 1, 1, 1, 1, 1]);
        assert_record_invariants(&data.para);
    }

    #[test]
    fn test_for_cn_strips_whitespace() {
        let g = make_generator(GeneratorConfig::default().for_cn(true));
        // without spaces the words run together into one unknown word
        let record = g.encode_single("hello world", 16).expect("valid length");
        assert_eq!(record.token_ids, vec![1, 3, 2]);

        let g = make_generator(GeneratorConfig::default());
        let record = g.encode_single("hello world", 16).expect("valid length");
        assert_eq!(record.token_ids, vec![1, 11, 13, 2]);
    }

    #[test]
    fn test_generate_cross() {
        let g = make_generator(GeneratorConfig::default());
        let record = g.generate_cross(&Example::new("hello", "title", "world!"));

        assert_eq!(record.token_ids, vec![1, 11, 2, 21, 13, 14, 2]);
        assert_eq!(record.segment_ids, vec![0, 0, 0, 1, 1, 1, 1]);
        assert_record_invariants(&record);
    }

    #[test]
    fn test_cross_truncation_respects_max_len() {
        let g = make_generator(GeneratorConfig::default().max_seq_length(6));
        let record = g.generate_cross(&Example::new(
            "hello world hello",
            "",
            "this is a long paragraph",
        ));
        assert_eq!(record.len(), 6);
        assert_record_invariants(&record);
        // a keeps its first two tokens, b its first one
        assert_eq!(record.token_ids, vec![1, 11, 13, 2, 15, 2]);
    }

    #[test]
    fn test_empty_fields_only_specials() {
        let g = make_generator(GeneratorConfig::default());
        let record = g.encode_single("", 8).expect("valid length");
        assert_eq!(record.token_ids, vec![1, 2]);

        let record = g.encode_pair("", "", 8).expect("valid length");
        assert_eq!(record.token_ids, vec![1, 2]);
        assert_eq!(record.segment_ids, vec![0, 0]);
    }

    #[test]
    fn test_single_truncation() {
        let g = make_generator(GeneratorConfig::default());
        let record = g
            .encode_single("this is a long paragraph", 4)
            .expect("valid length");
        assert_eq!(record.token_ids, vec![1, 15, 16, 2]);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        let vocab = Arc::new(Vocabulary::from_tokens(VOCAB.iter().copied()));
        let tok = Tokenizer::new(vocab, true);

        let result = Generator::new(tok.clone(), GeneratorConfig::default().max_seq_length(2));
        assert!(matches!(result, Err(RocketQaError::Config(_))));

        let result = Generator::new(tok, GeneratorConfig::default().query_max_seq_length(1));
        assert!(matches!(result, Err(RocketQaError::Config(_))));

        let g = make_generator(GeneratorConfig::default());
        assert!(g.encode_single("hello", 1).is_err());
        assert!(g.encode_pair("hello", "world", 2).is_err());
    }

    #[test]
    fn test_missing_special_token_rejected() {
        let vocab = Arc::new(Vocabulary::from_tokens(["[PAD]", "[CLS]", "[SEP]", "hello"]));
        let result = Generator::new(Tokenizer::new(vocab, true), GeneratorConfig::default());
        match result {
            Err(RocketQaError::Config(msg)) => assert!(msg.contains("[UNK]")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_pad_and_strip_round_trip() {
        let g = make_generator(GeneratorConfig::default());
        let batch = vec![vec![1, 11, 2], vec![1, 2], vec![], vec![1, 11, 13, 14, 2]];
        let (padded, masks) = g.pad(&batch);

        assert!(padded.iter().all(|s| s.len() == 5));
        assert_eq!(padded[1], vec![1, 2, 0, 0, 0]);
        assert_eq!(masks[1], vec![1.0, 1.0, 0.0, 0.0, 0.0]);

        let stripped: Vec<Vec<TokenId>> = padded
            .iter()
            .zip(&masks)
            .map(|(seq, mask)| {
                seq.iter()
                    .zip(mask)
                    .filter(|(_, &m)| m == 1.0)
                    .map(|(&id, _)| id)
                    .collect()
            })
            .collect();
        assert_eq!(stripped, batch);
    }

    #[test]
    fn test_pad_empty_batch() {
        let (padded, masks) = pad_sequences(&[], 0);
        assert!(padded.is_empty());
        assert!(masks.is_empty());
    }

    #[test]
    fn test_pad_records() {
        let g = make_generator(GeneratorConfig::default());
        let a = g.encode_single("hello", 8).expect("valid length");
        let b = g.encode_pair("hello", "world", 8).expect("valid length");
        let batch = g.pad_records(&[&a, &b]);

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.seq_len, 5);
        assert_eq!(batch.token_ids[0], vec![1, 11, 2, 0, 0]);
        assert_eq!(batch.segment_ids[1], vec![0, 0, 0, 1, 1]);
        assert_eq!(batch.position_ids[0], vec![0, 1, 2, 0, 0]);
        assert_eq!(batch.attention_mask[0], vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_example_constructors_and_clean() {
        let e = Example::from_query("q");
        assert_eq!((e.title.as_str(), e.para.as_str()), ("-", "-"));

        let mut e = Example::from_para("a b\tc", " t ");
        assert_eq!(e.query, "-");
        e.clean();
        assert_eq!(e.para, "abc");
        assert_eq!(e.title, "t");
    }

    #[test]
    fn test_record_serializes_field_names() {
        let g = make_generator(GeneratorConfig::default());
        let record = g.encode_single("hello", 8).expect("valid length");
        let json = serde_json::to_value(&record).expect("serializable");
        assert_eq!(json["token_ids"], serde_json::json!([1, 11, 2]));
        assert_eq!(json["segment_ids"], serde_json::json!([0, 0, 0]));
    }
}
