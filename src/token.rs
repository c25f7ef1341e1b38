use smallvec::SmallVec;

/// Token identifier: the zero-based line number of the token in the vocabulary file.
pub type TokenId = i64;

/// Classification token placed at the start of every sequence.
pub const CLS_TOKEN: &str = "[CLS]";
/// Separator token closing each segment.
pub const SEP_TOKEN: &str = "[SEP]";
/// Padding token used to right-pad a batch.
pub const PAD_TOKEN: &str = "[PAD]";
/// Emitted in place of a word that cannot be split into known pieces.
pub const UNK_TOKEN: &str = "[UNK]";

/// Prefix marking a piece that continues the previous one without a word boundary.
pub const CONTINUATION_PREFIX: &str = "##";

/// Words longer than this many characters are replaced by a single `[UNK]`.
pub const MAX_INPUT_CHARS_PER_WORD: usize = 100;

/// Stack-allocated buffer for the pieces of one word (up to 8 on stack).
///
/// Almost every word splits into a handful of pieces, so the common
/// case never touches the heap. Longer splits spill transparently.
pub type PieceBuffer = SmallVec<[String; 8]>;
