use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_MAX_CLIENTS: usize = 3;
/// Largest request line the server reads before giving up on it
pub const MAX_REQUEST_BYTES: usize = 4096;

/// Reply sent for empty, malformed or oversized requests
pub const ERROR_RESPONSE: &str = "Error: Invalid data format. Expected space-separated numbers.";

const ORIGINAL_PREFIX: &str = "Original array";
const DEDUPLICATED_PREFIX: &str = "Array without duplicates";

/// Why a request line could not be turned into numbers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("request contains no numbers")]
    Empty,
    #[error("token {token:?} is not a number")]
    InvalidNumber { token: String },
}

/// A server response that does not follow the report or error layout
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed response: {0}")]
pub struct ResponseError(pub String);

/// Outcome of one deduplication request
///
/// Holds the array as received and the order-preserving deduplicated copy.
/// Serialized under the `original`/`processed` keys used by statistics dumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub original: Vec<f64>,
    #[serde(rename = "processed")]
    pub deduplicated: Vec<f64>,
}

impl ProcessingResult {
    /// Deduplicates `original` and keeps both arrays
    pub fn new(original: Vec<f64>) -> Self {
        let deduplicated = deduplicate(&original);
        Self {
            original,
            deduplicated,
        }
    }

    /// Number of values as received
    pub fn original_len(&self) -> usize {
        self.original.len()
    }

    /// Number of values left after deduplication
    pub fn deduplicated_len(&self) -> usize {
        self.deduplicated.len()
    }

    /// Two-line report, see [`format_report`]
    pub fn report(&self) -> String {
        format_report(&self.original, &self.deduplicated)
    }
}

/// Parses one request line of whitespace separated numbers
pub fn parse_values(line: &str) -> Result<Vec<f64>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    trimmed
        .split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                token: token.to_string(),
            })
        })
        .collect()
}

/// Removes repeated values while keeping the first occurrence of each
///
/// Equality is exact `f64` equality: `0.0` and `-0.0` collapse into one
/// value and every NaN is kept, since NaN never equals anything.
pub fn deduplicate(values: &[f64]) -> Vec<f64> {
    let mut seen = HashSet::with_capacity(values.len());
    let mut unique = Vec::with_capacity(values.len());

    for &value in values {
        if value.is_nan() {
            unique.push(value);
            continue;
        }
        // Both zeros compare equal, so they share a key
        let key = if value == 0.0 { 0u64 } else { value.to_bits() };
        if seen.insert(key) {
            unique.push(value);
        }
    }

    unique
}

/// Parses a request line and deduplicates it in one step
///
/// Fails with the same [`ParseError`] as [`parse_values`]; an empty or
/// malformed line never reaches deduplication.
pub fn parse_and_process(line: &str) -> Result<ProcessingResult, ParseError> {
    parse_values(line).map(ProcessingResult::new)
}

/// Formats one value for the report
///
/// Whole numbers keep a trailing `.0`. Very large or very small magnitudes
/// use an exponent with an explicit sign and at least two digits (`1e+20`,
/// `1e-05`); non-finite values print as `nan`, `inf` and `-inf`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}

/// Space separated [`format_value`] output for a whole array
pub fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| format_value(*value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the two-line report sent back for a valid request
pub fn format_report(original: &[f64], deduplicated: &[f64]) -> String {
    format!(
        "{} ({} elements): {}\n{} ({} elements): {}",
        ORIGINAL_PREFIX,
        original.len(),
        format_values(original),
        DEDUPLICATED_PREFIX,
        deduplicated.len(),
        format_values(deduplicated)
    )
}

/// Encodes the identifier message sent right after admission
pub fn encode_client_id(client_id: u32) -> String {
    format!("{}\n", client_id)
}

/// Reads the identifier line; `None` if it is not a number
pub fn parse_client_id(line: &str) -> Option<u32> {
    line.trim().parse().ok()
}

/// Response as seen by a client
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Report {
        original: Vec<f64>,
        deduplicated: Vec<f64>,
    },
    Error(String),
}

impl Response {
    /// Parses everything the server sent after the identifier line
    ///
    /// A text starting with `Error:` is an error reply. Anything else must be
    /// a well-formed report whose element counts match the listed values.
    pub fn parse(text: &str) -> Result<Self, ResponseError> {
        let text = text.trim_end();
        if text.starts_with("Error:") {
            return Ok(Response::Error(text.to_string()));
        }

        let mut lines = text.lines();
        let original = parse_report_line(lines.next(), ORIGINAL_PREFIX)?;
        let deduplicated = parse_report_line(lines.next(), DEDUPLICATED_PREFIX)?;
        if lines.next().is_some() {
            return Err(ResponseError("trailing lines after report".to_string()));
        }

        Ok(Response::Report {
            original,
            deduplicated,
        })
    }

    /// True if the server rejected the request
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

fn parse_report_line(line: Option<&str>, prefix: &str) -> Result<Vec<f64>, ResponseError> {
    let line = line.ok_or_else(|| ResponseError(format!("missing `{}` line", prefix)))?;
    let rest = line
        .strip_prefix(prefix)
        .ok_or_else(|| ResponseError(format!("expected `{}`, got {:?}", prefix, line)))?;

    let (count, values) = rest
        .split_once("):")
        .ok_or_else(|| ResponseError(format!("no element count in {:?}", line)))?;
    let count: usize = count
        .trim()
        .trim_start_matches('(')
        .trim_end_matches("elements")
        .trim()
        .parse()
        .map_err(|_| ResponseError(format!("bad element count in {:?}", line)))?;

    let values = if values.trim().is_empty() {
        Vec::new()
    } else {
        parse_values(values).map_err(|e| ResponseError(e.to_string()))?
    };

    if values.len() != count {
        return Err(ResponseError(format!(
            "announced {} elements, found {}",
            count,
            values.len()
        )));
    }

    Ok(values)
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn timestamp_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}
