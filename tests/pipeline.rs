//! End-to-end: vocabulary file -> generator -> pool -> fake engine -> matrix.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rocketqa::{
    CrossEncoder, DualEncoder, EncoderConfig, Example, Predictor, Qpt, Qpts, Result,
    RocketQaError, Tensor, TensorData,
};

const VOCAB: &[&str] = &[
    "[PAD]", "[CLS]", "[SEP]", "[UNK]", "-", "你", "好", "，", "世", "界", "！", "hello", "world",
    "!", "rust",
];

const HIDDEN: usize = 4;

/// Deterministic engine: every embedding row is `[n, 1, 0, 0]` where `n` is
/// the number of real tokens in that row of the first input block.
struct FakeEngine {
    names: Vec<String>,
    running: Arc<AtomicUsize>,
}

struct FakeConfig {
    inputs: usize,
    running: Arc<AtomicUsize>,
}

impl Predictor for FakeEngine {
    type Config = FakeConfig;

    fn create(config: &FakeConfig) -> Result<Self> {
        Ok(Self {
            names: (0..config.inputs).map(|i| format!("input_{i}")).collect(),
            running: Arc::clone(&config.running),
        })
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            names: self.names.clone(),
            running: Arc::clone(&self.running),
        })
    }

    fn input_names(&self) -> &[String] {
        &self.names
    }

    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        self.running.fetch_add(1, Ordering::SeqCst);
        let batch = inputs[0].shape[0];

        let embed = |mask: &Tensor| -> Result<Tensor> {
            let seq_len = mask.shape[1];
            let mask = mask.as_f32()?;
            let mut data = Vec::with_capacity(batch * HIDDEN);
            for b in 0..batch {
                let n: f32 = mask[b * seq_len..(b + 1) * seq_len].iter().sum();
                data.extend([n, 1.0, 0.0, 0.0]);
            }
            Tensor::new(vec![batch, HIDDEN], TensorData::F32(data))
        };

        let outputs = if inputs.len() == 8 {
            vec![embed(&inputs[3])?, embed(&inputs[7])?]
        } else {
            let n = embed(&inputs[3])?;
            let scores: Vec<f32> = n
                .as_f32()?
                .chunks(HIDDEN)
                .flat_map(|row| [1.0 - row[0] / 10.0, row[0] / 10.0])
                .collect();
            vec![Tensor::new(vec![batch, 2], TensorData::F32(scores))?]
        };
        std::thread::sleep(Duration::from_millis(1));
        Ok(outputs)
    }
}

fn vocab_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for token in VOCAB {
        writeln!(file, "{token}").expect("write vocab");
    }
    file
}

fn fake_config(inputs: usize) -> FakeConfig {
    FakeConfig {
        inputs,
        running: Arc::new(AtomicUsize::new(0)),
    }
}

#[tokio::test]
async fn dual_encoder_end_to_end() {
    let vocab = vocab_file();
    let config = EncoderConfig::new(vocab.path()).for_cn(true).pool_size(2);
    let encoder = DualEncoder::<FakeEngine>::new(&config, &fake_config(8)).expect("encoder");

    // query: [CLS] 你 好 ， 世 界 ！ [SEP] -> 8 real tokens
    let reps = encoder
        .encode_query(&["你好，世界！", "hello"])
        .await
        .expect("encode");
    assert_eq!(reps.len(), 2);
    assert_eq!(&reps[0][..], &[8.0, 1.0, 0.0, 0.0]);
    assert_eq!(&reps[1][..], &[3.0, 1.0, 0.0, 0.0]);

    // para: [CLS] title [SEP] para [SEP], whitespace stripped for CJK
    let reps = encoder
        .encode_para(&["hello world"], &["rust"])
        .await
        .expect("encode");
    assert_eq!(reps[0][0], 5.0);

    let unit = reps[0].norm();
    let len: f32 = unit.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((len - 1.0).abs() < 1e-6);
    assert_eq!(unit.to_f64().len(), HIDDEN);
}

#[tokio::test]
async fn cross_encoder_end_to_end() {
    let vocab = vocab_file();
    let config = EncoderConfig::new(vocab.path()).max_seq_length(6).pool_size(1);
    let encoder = CrossEncoder::<FakeEngine>::new(&config, &fake_config(4)).expect("encoder");

    // truncated to the 6-token limit
    let score = encoder
        .rank("hello world hello", "rust rust rust rust", "")
        .await
        .expect("rank");
    assert!((score - 0.6).abs() < 1e-6);

    let qpts: Qpts = vec![
        Qpt::new("hello", "world", ""),
        Qpt::new("hello", "world", "rust"),
    ]
    .into();
    let scores = encoder.rank_batch(&qpts.0).await.expect("rank batch");
    assert_eq!(scores.len(), 2);
    assert!((scores[0] - 0.5).abs() < 1e-6);
    assert!((scores[1] - 0.6).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_the_pool() {
    let vocab = vocab_file();
    let config = EncoderConfig::new(vocab.path()).pool_size(3);
    let cfg = fake_config(8);
    let running = Arc::clone(&cfg.running);
    let encoder = Arc::new(DualEncoder::<FakeEngine>::new(&config, &cfg).expect("encoder"));

    let mut tasks = Vec::new();
    for i in 0..24 {
        let encoder = Arc::clone(&encoder);
        tasks.push(tokio::spawn(async move {
            let text = if i % 2 == 0 { "hello" } else { "hello world" };
            encoder.encode_query(&[text]).await
        }));
    }
    for task in tasks {
        let reps = task.await.expect("task").expect("encode");
        assert_eq!(reps.len(), 1);
    }

    let stats = encoder.pool().stats();
    assert_eq!(running.load(Ordering::SeqCst), 24);
    assert_eq!(stats.total_acquired, 24);
    assert!(stats.peak_in_use <= 3);
    assert_eq!(stats.available, 3);
}

#[test]
fn invalid_configuration_fails_at_construction() {
    let vocab = vocab_file();

    let config = EncoderConfig::new(vocab.path()).max_seq_length(2);
    assert!(matches!(
        CrossEncoder::<FakeEngine>::new(&config, &fake_config(4)),
        Err(RocketQaError::Config(_))
    ));

    let config = EncoderConfig::new("/no/such/vocab.txt");
    assert!(matches!(
        DualEncoder::<FakeEngine>::new(&config, &fake_config(8)),
        Err(RocketQaError::Io { .. })
    ));
}

#[test]
fn generator_records_from_file_vocab() {
    let vocab = vocab_file();
    let generator = EncoderConfig::new(vocab.path())
        .build_generator()
        .expect("generator");

    let record = generator.generate_cross(&Example::new("hello", "rust", "world!"));
    assert_eq!(record.token_ids, vec![1, 11, 2, 14, 12, 13, 2]);
    assert_eq!(record.segment_ids, vec![0, 0, 0, 1, 1, 1, 1]);
    assert_eq!(record.position_ids, vec![0, 1, 2, 3, 4, 5, 6]);
}
