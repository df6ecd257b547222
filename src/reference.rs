//! Linear-scan LPM used to cross-check [`MultibitTrie`].

use tracing::warn;

use crate::{MultibitTrie, NextHop, PrefixRecord, TrieError, MAX_PREFIX_LEN};

/// Reference matches reported per mismatch.
const MISMATCH_DETAIL: usize = 3;

/// Unindexed list of every inserted prefix, answering lookups by scanning all
/// of them.
///
/// Among matching prefixes the strictly longest wins; when several share the
/// longest length, the one inserted first wins.
#[derive(Clone, Debug, Default)]
pub struct ReferenceLpm {
    entries: Vec<PrefixRecord>,
}

impl ReferenceLpm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: u32, length: u8, next_hop: NextHop) -> Result<(), TrieError> {
        self.entries.push(PrefixRecord::new(prefix, length, next_hop)?);
        Ok(())
    }

    pub fn insert_record(&mut self, record: &PrefixRecord) -> Result<(), TrieError> {
        self.insert(record.prefix, record.length, record.next_hop)
    }

    pub fn lookup(&self, address: u32) -> Option<NextHop> {
        self.lookup_entry(address).map(|entry| entry.next_hop)
    }

    /// The record that wins for `address`.
    pub fn lookup_entry(&self, address: u32) -> Option<&PrefixRecord> {
        let mut best: Option<&PrefixRecord> = None;
        for entry in &self.entries {
            if !entry.matches(address) {
                continue;
            }
            if best.map_or(true, |b| entry.length > b.length) {
                best = Some(entry);
                if entry.length == MAX_PREFIX_LEN {
                    break;
                }
            }
        }
        best
    }

    /// Every record matching `address`, longest first, ties in insertion order.
    pub fn matching(&self, address: u32) -> Vec<&PrefixRecord> {
        let mut matches: Vec<&PrefixRecord> =
            self.entries.iter().filter(|e| e.matches(address)).collect();
        matches.sort_by(|a, b| b.length.cmp(&a.length));
        matches
    }

    pub fn entries(&self) -> &[PrefixRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<PrefixRecord> for ReferenceLpm {
    fn from_iter<I: IntoIterator<Item = PrefixRecord>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// An address the trie and the reference disagree on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub address: u32,
    pub trie: Option<NextHop>,
    pub reference: Option<NextHop>,
    /// Longest reference matches for the address.
    pub top_matches: Vec<PrefixRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrectnessReport {
    pub total: usize,
    pub mismatches: Vec<Mismatch>,
}

impl CorrectnessReport {
    pub fn correct(&self) -> usize {
        self.total - self.mismatches.len()
    }

    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Fraction of addresses answered identically, `1.0` for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.correct() as f64 / self.total as f64
    }
}

/// Looks up every address in both structures and records where they differ.
pub fn check_correctness<I>(
    trie: &MultibitTrie,
    reference: &ReferenceLpm,
    addresses: I,
) -> CorrectnessReport
where
    I: IntoIterator<Item = u32>,
{
    let mut report = CorrectnessReport::default();
    for address in addresses {
        report.total += 1;
        let got = trie.lookup(address);
        let expected = reference.lookup(address);
        if got == expected {
            continue;
        }

        warn!(
            address = format_args!("{address:#010X}"),
            trie = ?got,
            reference = ?expected,
            "trie and reference disagree"
        );
        report.mismatches.push(Mismatch {
            address,
            trie: got,
            reference: expected,
            top_matches: reference
                .matching(address)
                .into_iter()
                .take(MISMATCH_DETAIL)
                .copied()
                .collect(),
        });
    }
    report
}
