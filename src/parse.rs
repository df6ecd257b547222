//! Text formats for prefix tables and address lists.
//!
//! A prefix line is `<prefix_hex> <length> <next_hop>`, e.g. `0A400000 10 7`,
//! with the prefix left-aligned in 32 bits. An address is `0x`-prefixed hex,
//! plain decimal, or bare hex, tried in that order.

use std::io::BufRead;
use std::str::FromStr;

use tracing::warn;

use crate::{NextHop, ParseError, PrefixRecord, Stride, TrieError, MAX_PREFIX_LEN};

/// Parses a 32-bit hex value with or without a `0x`/`0X` prefix.
pub fn parse_hex(text: &str) -> Result<u32, ParseError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidHex(text.to_owned()))
}

pub fn parse_address(text: &str) -> Result<u32, ParseError> {
    let text = text.trim();
    if text.starts_with("0x") || text.starts_with("0X") {
        return parse_hex(text).map_err(|_| ParseError::InvalidAddress(text.to_owned()));
    }
    if let Ok(address) = text.parse::<u32>() {
        return Ok(address);
    }
    parse_hex(text).map_err(|_| ParseError::InvalidAddress(text.to_owned()))
}

fn parse_int<T: FromStr>(text: &str) -> Result<T, ParseError> {
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_owned()))
}

impl FromStr for PrefixRecord {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        let (Some(prefix), Some(length), Some(next_hop)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::MalformedRecord(line.to_owned()));
        };

        let prefix = parse_hex(prefix)?;
        let length: i64 = parse_int(length)?;
        let next_hop: NextHop = parse_int(next_hop)?;
        let length = u8::try_from(length)
            .ok()
            .filter(|&len| len <= MAX_PREFIX_LEN)
            .ok_or(TrieError::InvalidPrefixLength(length))?;

        Ok(PrefixRecord::new(prefix, length, next_hop)?)
    }
}

impl FromStr for Stride {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bits: u32 = parse_int(text.trim())?;
        Ok(Stride::try_from(bits)?)
    }
}

/// Reads one prefix record per line. Blank lines are ignored and malformed
/// lines are skipped with a warning; read failures are returned.
pub fn read_prefix_records<R: BufRead>(reader: R) -> Result<Vec<PrefixRecord>, ParseError> {
    read_lines(reader, "prefix record", |line| line.parse())
}

/// Reads one address per line, with the same skipping rules as
/// [`read_prefix_records`].
pub fn read_addresses<R: BufRead>(reader: R) -> Result<Vec<u32>, ParseError> {
    read_lines(reader, "address", parse_address)
}

fn read_lines<R, T, F>(reader: R, what: &'static str, mut parse: F) -> Result<Vec<T>, ParseError>
where
    R: BufRead,
    F: FnMut(&str) -> Result<T, ParseError>,
{
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse(line) {
            Ok(value) => out.push(value),
            Err(err) => warn!(line = idx + 1, %err, "skipping malformed {what}"),
        }
    }
    Ok(out)
}
