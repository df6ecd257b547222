use thiserror::Error;

/// Errors raised by [`MultibitTrie`](crate::MultibitTrie) and
/// [`ReferenceLpm`](crate::ReferenceLpm).
///
/// Every variant is returned before the structure is touched, so a rejected
/// call leaves the table exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    #[error("stride must be 1, 2, 4, or 8 (got {0})")]
    InvalidStride(u32),

    #[error("prefix length must be between 0 and 32 (got {0})")]
    InvalidPrefixLength(i64),

    /// The node arena is addressed by 32-bit indices.
    #[error("node arena is full ({0} nodes)")]
    NodeLimit(usize),
}

/// Errors from the text formats in [`parse`](crate::parse).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected `<prefix_hex> <length> <next_hop>`, got {0:?}")]
    MalformedRecord(String),

    #[error("invalid hexadecimal value {0:?}")]
    InvalidHex(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Route(#[from] TrieError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}
