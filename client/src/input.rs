//! Request preparation for the command line client
//!
//! Numbers come from the command line, from stdin, or are generated at
//! random for load testing.

use rand::Rng;
use shared::ParseError;

/// Checks a request line locally before it is sent
///
/// Mirrors the server's parser so that obviously broken input is refused
/// without occupying an admission slot.
pub fn validate_request(line: &str) -> Result<Vec<f64>, ParseError> {
    shared::parse_values(line)
}

/// Generates `count` random integers in `0..max_value`, formatted as a request
///
/// A small value range makes duplicates likely, which is the point.
pub fn random_request<R: Rng>(rng: &mut R, count: usize, max_value: u32) -> String {
    let max_value = max_value.max(1);
    (0..count)
        .map(|_| rng.gen_range(0..max_value).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
