//! Multiplier Text Parsing
//!
//! Accepts values as players copy them from a game screen: `2.95x`,
//! `1.00X`, or comma/space separated lists of those.

use thiserror::Error;

/// Parse errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Input was empty.
    #[error("empty multiplier")]
    Empty,
    /// Input was not a number.
    #[error("not a number: {0:?}")]
    NotANumber(String),
    /// Value was below 1.
    #[error("multiplier {0} must be >= 1")]
    BelowOne(f64),
}

/// Strip one trailing `x`/`X` and parse.
fn parse_token(token: &str) -> Option<f64> {
    let token = token.trim();
    let token = token
        .strip_suffix('x')
        .or_else(|| token.strip_suffix('X'))
        .unwrap_or(token)
        .trim();
    token.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse a single multiplier and require it to be >= 1.
pub fn parse_multiplier(input: &str) -> Result<f64, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let value = parse_token(input).ok_or_else(|| ParseError::NotANumber(input.to_string()))?;
    if !value.is_finite() || value < 1.0 {
        return Err(ParseError::BelowOne(value));
    }
    Ok(value)
}

/// Parse every numeric token of a list, skipping the rest.
///
/// Range checks are left to the caller.
pub fn parse_multiplier_list(text: &str) -> Vec<f64> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .filter_map(parse_token)
        .collect()
}
