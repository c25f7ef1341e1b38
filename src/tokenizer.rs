//! WordPiece tokenizer for BERT/ERNIE-style vocabularies.
//!
//! The pipeline for one text:
//! 1. Clean: drop control characters, map every whitespace character to one ASCII space.
//! 2. Isolate Han ideographs and punctuation by surrounding them with spaces,
//!    lowercasing along the way when configured.
//! 3. Split on single spaces, discarding empty candidates.
//! 4. Split every candidate word into vocabulary pieces with greedy
//!    longest-match-first search.
//!
//! Tokenization has no error path. A word that cannot be split becomes `[UNK]`.

use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;
use crate::token::{
    PieceBuffer, TokenId, CONTINUATION_PREFIX, MAX_INPUT_CHARS_PER_WORD, UNK_TOKEN,
};
use crate::vocab::Vocabulary;

/// Code point ranges of the Han script.
const HAN_RANGES: &[(u32, u32)] = &[
    (0x2E80, 0x2E99),
    (0x2E9B, 0x2EF3),
    (0x2F00, 0x2FD5),
    (0x3005, 0x3005),
    (0x3007, 0x3007),
    (0x3021, 0x3029),
    (0x3038, 0x303B),
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    (0xF900, 0xFA6D),
    (0xFA70, 0xFAD9),
    (0x16FE2, 0x16FE3),
    (0x16FF0, 0x16FF1),
    (0x20000, 0x2A6DF),
    (0x2A700, 0x2B739),
    (0x2B740, 0x2B81D),
    (0x2B820, 0x2CEA1),
    (0x2CEB0, 0x2EBE0),
    (0x2F800, 0x2FA1D),
    (0x30000, 0x3134A),
    (0x31350, 0x323AF),
];

/// Code point ranges of Unicode general category P (punctuation), Unicode 14.
///
/// ASCII symbols such as `$`, `+`, `<`, `^`, `|` and `~` are in category S,
/// not P, and are therefore not isolated.
const PUNCTUATION_RANGES: &[(u32, u32)] = &[
    (0x21, 0x23),
    (0x25, 0x2A),
    (0x2C, 0x2F),
    (0x3A, 0x3B),
    (0x3F, 0x40),
    (0x5B, 0x5D),
    (0x5F, 0x5F),
    (0x7B, 0x7B),
    (0x7D, 0x7D),
    (0xA1, 0xA1),
    (0xA7, 0xA7),
    (0xAB, 0xAB),
    (0xB6, 0xB7),
    (0xBB, 0xBB),
    (0xBF, 0xBF),
    (0x37E, 0x37E),
    (0x387, 0x387),
    (0x55A, 0x55F),
    (0x589, 0x58A),
    (0x5BE, 0x5BE),
    (0x5C0, 0x5C0),
    (0x5C3, 0x5C3),
    (0x5C6, 0x5C6),
    (0x5F3, 0x5F4),
    (0x609, 0x60A),
    (0x60C, 0x60D),
    (0x61B, 0x61B),
    (0x61D, 0x61F),
    (0x66A, 0x66D),
    (0x6D4, 0x6D4),
    (0x700, 0x70D),
    (0x7F7, 0x7F9),
    (0x830, 0x83E),
    (0x85E, 0x85E),
    (0x964, 0x965),
    (0x970, 0x970),
    (0x9FD, 0x9FD),
    (0xA76, 0xA76),
    (0xAF0, 0xAF0),
    (0xC77, 0xC77),
    (0xC84, 0xC84),
    (0xDF4, 0xDF4),
    (0xE4F, 0xE4F),
    (0xE5A, 0xE5B),
    (0xF04, 0xF12),
    (0xF14, 0xF14),
    (0xF3A, 0xF3D),
    (0xF85, 0xF85),
    (0xFD0, 0xFD4),
    (0xFD9, 0xFDA),
    (0x104A, 0x104F),
    (0x10FB, 0x10FB),
    (0x1360, 0x1368),
    (0x1400, 0x1400),
    (0x166E, 0x166E),
    (0x169B, 0x169C),
    (0x16EB, 0x16ED),
    (0x1735, 0x1736),
    (0x17D4, 0x17D6),
    (0x17D8, 0x17DA),
    (0x1800, 0x180A),
    (0x1944, 0x1945),
    (0x1A1E, 0x1A1F),
    (0x1AA0, 0x1AA6),
    (0x1AA8, 0x1AAD),
    (0x1B5A, 0x1B60),
    (0x1B7D, 0x1B7E),
    (0x1BFC, 0x1BFF),
    (0x1C3B, 0x1C3F),
    (0x1C7E, 0x1C7F),
    (0x1CC0, 0x1CC7),
    (0x1CD3, 0x1CD3),
    (0x2010, 0x2027),
    (0x2030, 0x2043),
    (0x2045, 0x2051),
    (0x2053, 0x205E),
    (0x207D, 0x207E),
    (0x208D, 0x208E),
    (0x2308, 0x230B),
    (0x2329, 0x232A),
    (0x2768, 0x2775),
    (0x27C5, 0x27C6),
    (0x27E6, 0x27EF),
    (0x2983, 0x2998),
    (0x29D8, 0x29DB),
    (0x29FC, 0x29FD),
    (0x2CF9, 0x2CFC),
    (0x2CFE, 0x2CFF),
    (0x2D70, 0x2D70),
    (0x2E00, 0x2E2E),
    (0x2E30, 0x2E4F),
    (0x2E52, 0x2E5D),
    (0x3001, 0x3003),
    (0x3008, 0x3011),
    (0x3014, 0x301F),
    (0x3030, 0x3030),
    (0x303D, 0x303D),
    (0x30A0, 0x30A0),
    (0x30FB, 0x30FB),
    (0xA4FE, 0xA4FF),
    (0xA60D, 0xA60F),
    (0xA673, 0xA673),
    (0xA67E, 0xA67E),
    (0xA6F2, 0xA6F7),
    (0xA874, 0xA877),
    (0xA8CE, 0xA8CF),
    (0xA8F8, 0xA8FA),
    (0xA8FC, 0xA8FC),
    (0xA92E, 0xA92F),
    (0xA95F, 0xA95F),
    (0xA9C1, 0xA9CD),
    (0xA9DE, 0xA9DF),
    (0xAA5C, 0xAA5F),
    (0xAADE, 0xAADF),
    (0xAAF0, 0xAAF1),
    (0xABEB, 0xABEB),
    (0xFD3E, 0xFD3F),
    (0xFE10, 0xFE19),
    (0xFE30, 0xFE52),
    (0xFE54, 0xFE61),
    (0xFE63, 0xFE63),
    (0xFE68, 0xFE68),
    (0xFE6A, 0xFE6B),
    (0xFF01, 0xFF03),
    (0xFF05, 0xFF0A),
    (0xFF0C, 0xFF0F),
    (0xFF1A, 0xFF1B),
    (0xFF1F, 0xFF20),
    (0xFF3B, 0xFF3D),
    (0xFF3F, 0xFF3F),
    (0xFF5B, 0xFF5B),
    (0xFF5D, 0xFF5D),
    (0xFF5F, 0xFF65),
    (0x10100, 0x10102),
    (0x1039F, 0x1039F),
    (0x103D0, 0x103D0),
    (0x1056F, 0x1056F),
    (0x10857, 0x10857),
    (0x1091F, 0x1091F),
    (0x1093F, 0x1093F),
    (0x10A50, 0x10A58),
    (0x10A7F, 0x10A7F),
    (0x10AF0, 0x10AF6),
    (0x10B39, 0x10B3F),
    (0x10B99, 0x10B9C),
    (0x10EAD, 0x10EAD),
    (0x10F55, 0x10F59),
    (0x10F86, 0x10F89),
    (0x11047, 0x1104D),
    (0x110BB, 0x110BC),
    (0x110BE, 0x110C1),
    (0x11140, 0x11143),
    (0x11174, 0x11175),
    (0x111C5, 0x111C8),
    (0x111CD, 0x111CD),
    (0x111DB, 0x111DB),
    (0x111DD, 0x111DF),
    (0x11238, 0x1123D),
    (0x112A9, 0x112A9),
    (0x1144B, 0x1144F),
    (0x1145A, 0x1145B),
    (0x1145D, 0x1145D),
    (0x114C6, 0x114C6),
    (0x115C1, 0x115D7),
    (0x11641, 0x11643),
    (0x11660, 0x1166C),
    (0x116B9, 0x116B9),
    (0x1173C, 0x1173E),
    (0x1183B, 0x1183B),
    (0x11944, 0x11946),
    (0x119E2, 0x119E2),
    (0x11A3F, 0x11A46),
    (0x11A9A, 0x11A9C),
    (0x11A9E, 0x11AA2),
    (0x11C41, 0x11C45),
    (0x11C70, 0x11C71),
    (0x11EF7, 0x11EF8),
    (0x11FFF, 0x11FFF),
    (0x12470, 0x12474),
    (0x12FF1, 0x12FF2),
    (0x16A6E, 0x16A6F),
    (0x16AF5, 0x16AF5),
    (0x16B37, 0x16B3B),
    (0x16B44, 0x16B44),
    (0x16E97, 0x16E9A),
    (0x16FE2, 0x16FE2),
    (0x1BC9F, 0x1BC9F),
    (0x1DA87, 0x1DA8B),
    (0x1E95E, 0x1E95F),
];

#[inline]
fn in_ranges(c: char, ranges: &[(u32, u32)]) -> bool {
    let cp = c as u32;
    ranges
        .binary_search_by(|&(lo, hi)| {
            if hi < cp {
                std::cmp::Ordering::Less
            } else if lo > cp {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Returns true for Han ideographs (CJK unified ideographs and related blocks).
#[inline]
pub fn is_han(c: char) -> bool {
    in_ranges(c, HAN_RANGES)
}

/// Returns true for characters in Unicode general category P.
#[inline]
pub fn is_punctuation(c: char) -> bool {
    in_ranges(c, PUNCTUATION_RANGES)
}

/// Greedy longest-match-first splitter for a single word.
#[derive(Debug, Clone)]
pub struct WordpieceTokenizer {
    vocab: Arc<Vocabulary>,
    unk_token: String,
    max_input_chars_per_word: usize,
}

impl WordpieceTokenizer {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            unk_token: UNK_TOKEN.to_string(),
            max_input_chars_per_word: MAX_INPUT_CHARS_PER_WORD,
        }
    }

    /// Split one whitespace-free word into its pieces.
    ///
    /// For example, with a suitable vocabulary `"unaffable"` becomes
    /// `["un", "##aff", "##able"]`. An empty word yields no pieces. A word
    /// longer than the character limit, or one with a position where no
    /// piece matches, yields a single `[UNK]`.
    pub fn tokenize(&self, word: &str) -> PieceBuffer {
        let mut pieces = PieceBuffer::new();

        let chars: Vec<char> = word.chars().collect();
        if chars.is_empty() {
            return pieces;
        }
        if chars.len() > self.max_input_chars_per_word {
            pieces.push(self.unk_token.clone());
            return pieces;
        }

        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut matched = None;

            while start < end {
                let mut candidate = String::with_capacity((end - start) * 4 + 2);
                if start > 0 {
                    candidate.push_str(CONTINUATION_PREFIX);
                }
                candidate.extend(&chars[start..end]);

                if self.vocab.contains(&candidate) {
                    matched = Some(candidate);
                    break;
                }
                end -= 1;
            }

            match matched {
                Some(piece) => {
                    pieces.push(piece);
                    start = end;
                }
                None => {
                    // discard partial pieces for this word
                    pieces.clear();
                    pieces.push(self.unk_token.clone());
                    return pieces;
                }
            }
        }

        pieces
    }
}

/// Full text tokenizer: cleanup, CJK/punctuation isolation and WordPiece.
///
/// Cheap to clone: the vocabulary is shared.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Arc<Vocabulary>,
    wordpiece: WordpieceTokenizer,
    do_lower_case: bool,
}

impl Tokenizer {
    /// Creates a tokenizer over an already loaded vocabulary.
    pub fn new(vocab: Arc<Vocabulary>, do_lower_case: bool) -> Self {
        Self {
            wordpiece: WordpieceTokenizer::new(Arc::clone(&vocab)),
            vocab,
            do_lower_case,
        }
    }

    /// Loads the vocabulary file and creates a tokenizer over it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RocketQaError::Io`] if the vocabulary cannot be read.
    pub fn from_file(vocab_file: impl AsRef<Path>, do_lower_case: bool) -> Result<Self> {
        let vocab = Vocabulary::load(vocab_file)?;
        Ok(Self::new(Arc::new(vocab), do_lower_case))
    }

    /// Tokenize text using the lowercase setting chosen at construction.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenize_with(text, self.do_lower_case)
    }

    /// Tokenize text with an explicit lowercase setting.
    pub fn tokenize_with(&self, text: &str, lowercase: bool) -> Vec<String> {
        let cleaned = clean_text(text);
        let segmented = isolate_cjk_and_punctuation(&cleaned, lowercase);

        let mut tokens = Vec::new();
        for word in segmented.split(' ').filter(|w| !w.is_empty()) {
            tokens.extend(self.wordpiece.tokenize(word));
        }
        tokens
    }

    /// Tokenize many texts, in parallel when the `parallel` feature is enabled.
    ///
    /// Output order matches input order.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Vec<Vec<String>> {
        #[cfg(feature = "parallel")]
        {
            texts.par_iter().map(|text| self.tokenize(text)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            texts.iter().map(|text| self.tokenize(text)).collect()
        }
    }

    /// See [`Vocabulary::tokens_to_ids`]: unknown tokens are dropped.
    pub fn tokens_to_ids<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<TokenId> {
        self.vocab.tokens_to_ids(tokens)
    }

    pub fn ids_to_tokens(&self, ids: &[TokenId]) -> Vec<String> {
        self.vocab.ids_to_tokens(ids)
    }

    #[inline]
    pub fn vocab(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    #[inline]
    pub fn do_lower_case(&self) -> bool {
        self.do_lower_case
    }
}

/// Drops control characters and maps each whitespace character to one space.
///
/// Control characters are checked first, so `\t`, `\n` and `\r` (which are
/// control characters) are removed rather than turned into spaces.
fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Surrounds Han ideographs and punctuation with spaces.
fn isolate_cjk_and_punctuation(text: &str, lowercase: bool) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        let isolate = is_han(c) || is_punctuation(c);
        if isolate {
            out.push(' ');
        }
        if lowercase {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        if isolate {
            out.push(' ');
        }
    }
    out
}
