//! Verification sample selection
//!
//! A manifest may ask for a subset of its objects to be verified after
//! compression. The directive is one of:
//!
//! - blank or absent: nothing is verified
//! - `all` (any case): every object is verified
//! - `numerator/denominator`: that proportion of the distinct object names,
//!   drawn uniformly without replacement
//!
//! Proportional sizes are rounded to the nearest integer with ties going to
//! the even neighbour (`1/2` of 5 names is 2, `1/2` of 7 names is 4), and are
//! computed in exact integer arithmetic so no float error creeps in at the
//! `.5` boundary.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use rand::Rng;
use regex_lite::Regex;

/// Keyword selecting every object for verification
pub const ALL_KEYWORD: &str = "all";

/// Errors raised while parsing a sampling directive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    #[error("invalid sampling directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
}

/// Parsed sampling directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleDirective {
    /// No verification sampling
    #[default]
    None,
    /// Verify every object
    All,
    /// Verify `numerator / denominator` of the objects
    Proportion { numerator: u64, denominator: u64 },
}

fn proportion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*/\s*(\d+)\s*$").expect("proportion pattern is valid")
    })
}

impl SampleDirective {
    /// Parse a directive from manifest text.
    pub fn parse(text: &str) -> Result<Self, SampleError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(SampleDirective::None);
        }
        if trimmed.eq_ignore_ascii_case(ALL_KEYWORD) {
            return Ok(SampleDirective::All);
        }

        let invalid = |reason: &str| SampleError::InvalidDirective {
            directive: text.to_string(),
            reason: reason.to_string(),
        };

        let caps = proportion_pattern().captures(trimmed).ok_or_else(|| {
            invalid("expected blank, 'all', or a proportion such as '1/4'")
        })?;

        let numerator: u64 = caps[1]
            .parse()
            .map_err(|_| invalid("numerator is out of range"))?;
        let denominator: u64 = caps[2]
            .parse()
            .map_err(|_| invalid("denominator is out of range"))?;
        if denominator == 0 {
            return Err(invalid("denominator cannot be 0"));
        }

        Ok(SampleDirective::Proportion { numerator, denominator })
    }

    /// Parse an optional directive; absent means no sampling.
    pub fn parse_optional(text: Option<&str>) -> Result<Self, SampleError> {
        text.map_or(Ok(SampleDirective::None), Self::parse)
    }

    /// Whether this directive asks for any verification at all
    pub fn is_active(&self) -> bool {
        !matches!(self, SampleDirective::None)
    }

    /// Number of objects to draw out of `count` distinct names.
    pub fn sample_size(&self, count: usize) -> usize {
        match *self {
            SampleDirective::None => 0,
            SampleDirective::All => count,
            SampleDirective::Proportion { numerator, denominator } => {
                let scaled = u128::from(numerator) * count as u128;
                let size = round_half_even(scaled, u128::from(denominator));
                usize::try_from(size).map_or(count, |s| s.min(count))
            }
        }
    }
}

impl fmt::Display for SampleDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleDirective::None => f.write_str("none"),
            SampleDirective::All => f.write_str(ALL_KEYWORD),
            SampleDirective::Proportion { numerator, denominator } => {
                write!(f, "{}/{}", numerator, denominator)
            }
        }
    }
}

/// `dividend / divisor` rounded to nearest, ties to even. `divisor` is nonzero.
fn round_half_even(dividend: u128, divisor: u128) -> u128 {
    let quotient = dividend / divisor;
    let remainder = dividend % divisor;
    let twice = remainder * 2;
    if twice > divisor || (twice == divisor && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// Select the names designated for verification.
///
/// The size is computed against the full list, duplicates included. The draw
/// is over distinct names, so the size is capped at the distinct count.
pub fn select_sample<R, S>(directive: SampleDirective, names: &[S], rng: &mut R) -> BTreeSet<String>
where
    R: Rng + ?Sized,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let distinct: Vec<&str> = names
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| seen.insert(*name))
        .collect();

    match directive {
        SampleDirective::None => BTreeSet::new(),
        SampleDirective::All => distinct.iter().map(|n| n.to_string()).collect(),
        SampleDirective::Proportion { .. } => {
            let amount = directive.sample_size(names.len()).min(distinct.len());
            rand::seq::index::sample(rng, distinct.len(), amount)
                .into_iter()
                .map(|i| distinct[i].to_string())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("obj-{:02}", i)).collect()
    }

    #[test]
    fn test_parse_blank() {
        assert_eq!(SampleDirective::parse("").unwrap(), SampleDirective::None);
        assert_eq!(SampleDirective::parse("   ").unwrap(), SampleDirective::None);
        assert_eq!(SampleDirective::parse_optional(None).unwrap(), SampleDirective::None);
    }

    #[test]
    fn test_parse_all_any_case() {
        for text in ["all", "ALL", "All", "  aLl  "] {
            assert_eq!(SampleDirective::parse(text).unwrap(), SampleDirective::All, "{}", text);
        }
    }

    #[test]
    fn test_parse_proportion_with_whitespace() {
        let expected = SampleDirective::Proportion { numerator: 3, denominator: 4 };
        assert_eq!(SampleDirective::parse("3/4").unwrap(), expected);
        assert_eq!(SampleDirective::parse("3 / 4").unwrap(), expected);
        assert_eq!(SampleDirective::parse(" 3/ 4 ").unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_words() {
        let err = SampleDirective::parse("two thirds").unwrap_err();
        assert!(err.to_string().contains("two thirds"));
    }

    #[test]
    fn test_parse_rejects_zero_denominator() {
        let err = SampleDirective::parse("5/0").unwrap_err();
        assert!(err.to_string().contains("denominator cannot be 0"));
    }

    #[test]
    fn test_parse_rejects_other_forms() {
        for text in ["0.5", "-1/2", "1/2/3", "50%", "5", "1/ ", "everything"] {
            assert!(SampleDirective::parse(text).is_err(), "{} should be rejected", text);
        }
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(SampleDirective::parse("99999999999999999999999/1").is_err());
    }

    #[test]
    fn test_sample_size_rounding() {
        let half = SampleDirective::Proportion { numerator: 1, denominator: 2 };
        assert_eq!(half.sample_size(10), 5);
        assert_eq!(half.sample_size(5), 2);
        assert_eq!(half.sample_size(7), 4);
        assert_eq!(half.sample_size(1), 0);

        let third = SampleDirective::Proportion { numerator: 1, denominator: 3 };
        assert_eq!(third.sample_size(10), 3);
        assert_eq!(third.sample_size(2), 1);
    }

    #[test]
    fn test_sample_size_clamped() {
        let over = SampleDirective::Proportion { numerator: 3, denominator: 2 };
        assert_eq!(over.sample_size(4), 4);
        let huge = SampleDirective::Proportion { numerator: u64::MAX, denominator: 1 };
        assert_eq!(huge.sample_size(3), 3);
    }

    #[test]
    fn test_select_none_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_sample(SampleDirective::None, &names(10), &mut rng).is_empty());
    }

    #[test]
    fn test_select_all_returns_every_name_once() {
        let mut rng = StdRng::seed_from_u64(1);
        let all = names(10);
        let sample = select_sample(SampleDirective::All, &all, &mut rng);
        assert_eq!(sample.len(), 10);
        assert!(all.iter().all(|n| sample.contains(n)));
    }

    #[test]
    fn test_select_half_of_ten() {
        let mut rng = StdRng::seed_from_u64(99);
        let all = names(10);
        let sample = select_sample(SampleDirective::parse("1/2").unwrap(), &all, &mut rng);
        assert_eq!(sample.len(), 5);
        assert!(sample.iter().all(|n| all.contains(n)));
    }

    #[test]
    fn test_select_zero_proportion() {
        let mut rng = StdRng::seed_from_u64(3);
        let sample = select_sample(SampleDirective::parse("0/3").unwrap(), &names(6), &mut rng);
        assert!(sample.is_empty());
    }

    #[test]
    fn test_select_seeded_is_reproducible() {
        let all = names(20);
        let directive = SampleDirective::parse("1/4").unwrap();
        let a = select_sample(directive, &all, &mut StdRng::seed_from_u64(5));
        let b = select_sample(directive, &all, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_select_with_duplicates_sizes_from_full_list() {
        let mut rng = StdRng::seed_from_u64(11);
        let dupes = vec!["a", "b", "a", "c", "b", "d"];
        let sample = select_sample(SampleDirective::parse("1/2").unwrap(), &dupes, &mut rng);
        assert_eq!(sample.len(), 3);

        let every = select_sample(SampleDirective::All, &dupes, &mut rng);
        assert_eq!(every.len(), 4);
    }

    #[test]
    fn test_select_with_duplicates_capped_at_distinct() {
        let mut rng = StdRng::seed_from_u64(4);
        let pairs = vec!["A", "A", "B", "B"];
        let sample = select_sample(SampleDirective::parse("1/2").unwrap(), &pairs, &mut rng);
        let expected: BTreeSet<String> = ["A", "B"].iter().map(|n| n.to_string()).collect();
        assert_eq!(sample, expected);

        let most = select_sample(SampleDirective::parse("3/4").unwrap(), &pairs, &mut rng);
        assert_eq!(most, expected);
    }

    #[test]
    fn test_select_over_unity_returns_every_name() {
        let all = names(7);
        for directive in [
            SampleDirective::parse("3/2").unwrap(),
            SampleDirective::Proportion { numerator: u64::MAX, denominator: 1 },
        ] {
            let sample = select_sample(directive, &all, &mut StdRng::seed_from_u64(8));
            assert_eq!(sample.len(), all.len(), "{}", directive);
            assert!(all.iter().all(|n| sample.contains(n)));
        }
    }

    #[test]
    fn test_is_active() {
        assert!(!SampleDirective::None.is_active());
        assert!(SampleDirective::All.is_active());
        assert!(SampleDirective::parse("0/1").unwrap().is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(SampleDirective::parse("1 / 3").unwrap().to_string(), "1/3");
        assert_eq!(SampleDirective::All.to_string(), "all");
    }
}
