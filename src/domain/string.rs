//! Lexicographic string domain
//!
//! Strings are ranked among all strings of printable ASCII characters
//! (U+0020 through U+007E) of at most `max_length` characters, in plain
//! code-point order. The rank is the number of such strings sorting before
//! the value, so the midpoint of two ranks is the lexicographic midpoint of
//! the two strings.

use crate::error::{ConfigError, Result};

use super::{Bound, FieldKind, OrderingDomain, domain_mismatch};

const FIRST: u8 = b' ';
const LAST: u8 = b'~';
const ALPHABET: i128 = (LAST - FIRST + 1) as i128;

/// Longest probe length whose rank space still fits an `i128`.
pub const MAX_STRING_LENGTH: usize = 17;

/// Default probe length.
pub const DEFAULT_STRING_LENGTH: usize = 16;

/// Ordering strategy for string fields.
#[derive(Debug, Clone)]
pub struct StringDomain {
    max_length: usize,
    /// `subtree[n]` is the number of strings of length `<= n`.
    subtree: Vec<i128>,
}

impl StringDomain {
    pub fn new(max_length: usize) -> Result<Self> {
        if max_length == 0 || max_length > MAX_STRING_LENGTH {
            return Err(ConfigError::InvalidValue {
                field: "partition.string_max_length".to_string(),
                value: max_length.to_string(),
            }
            .into());
        }

        let mut subtree = Vec::with_capacity(max_length + 1);
        let mut power: i128 = 1;
        let mut total: i128 = 0;
        for _ in 0..=max_length {
            total += power;
            subtree.push(total);
            power *= ALPHABET;
        }

        Ok(Self {
            max_length,
            subtree,
        })
    }

    /// Rank of the largest representable string not greater than `value`.
    fn rank(&self, value: &str) -> i128 {
        let mut rank = 0;
        let mut remaining = self.max_length;

        for ch in value.chars() {
            if remaining == 0 {
                // longer than any probe: floor to the truncated prefix
                break;
            }
            let code = u32::from(ch);
            if code < u32::from(FIRST) {
                break;
            }
            if code > u32::from(LAST) {
                // sorts after every extension of the prefix
                for _ in 0..remaining {
                    rank += 1 + (ALPHABET - 1) * self.subtree[remaining - 1];
                    remaining -= 1;
                }
                break;
            }
            let index = i128::from(code - u32::from(FIRST));
            rank += 1 + index * self.subtree[remaining - 1];
            remaining -= 1;
        }

        rank
    }

    fn unrank(&self, mut rank: i128) -> String {
        let mut value = String::new();
        let mut remaining = self.max_length;

        while rank > 0 && remaining > 0 {
            rank -= 1;
            let block = self.subtree[remaining - 1];
            let index = rank / block;
            rank %= block;
            value.push(char::from(FIRST + index as u8));
            remaining -= 1;
        }

        value
    }
}

impl OrderingDomain for StringDomain {
    fn kind(&self) -> FieldKind {
        FieldKind::String
    }

    fn ordinal_range(&self) -> (i128, i128) {
        (0, self.subtree[self.max_length] - 1)
    }

    fn to_ordinal(&self, value: &Bound) -> Result<i128> {
        match value {
            Bound::String(s) => Ok(self.rank(s)),
            other => Err(domain_mismatch(self.kind(), other)),
        }
    }

    fn from_ordinal(&self, ordinal: i128) -> Bound {
        let (lo, hi) = self.ordinal_range();
        Bound::String(self.unrank(ordinal.clamp(lo, hi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinal(domain: &StringDomain, s: &str) -> i128 {
        domain.to_ordinal(&Bound::String(s.to_string())).unwrap()
    }

    #[test]
    fn test_rank_follows_lexicographic_order() {
        let domain = StringDomain::new(4).unwrap();
        let mut words = vec!["", " ", "a", "a ", "aa", "ab", "b", "zz~~", "~", "~~~~"];
        words.sort();
        let ranks: Vec<i128> = words.iter().map(|w| ordinal(&domain, w)).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]), "{ranks:?}");
        assert_eq!(ranks[0], 0);
        assert_eq!(*ranks.last().unwrap(), domain.ordinal_range().1);
    }

    #[test]
    fn test_unrank_inverts_rank() {
        let domain = StringDomain::new(5).unwrap();
        for word in ["", "hello", "a~ b", "~~~~~", "Zebra", "0"] {
            let rank = ordinal(&domain, word);
            assert_eq!(domain.from_ordinal(rank), Bound::String(word.to_string()));
        }
    }

    #[test]
    fn test_unrepresentable_values_floor() {
        let domain = StringDomain::new(3).unwrap();
        // too long: floors to its prefix
        assert_eq!(ordinal(&domain, "abcd"), ordinal(&domain, "abc"));
        // control character: floors to the prefix before it
        assert_eq!(ordinal(&domain, "ab\tz"), ordinal(&domain, "ab"));
        // non-ASCII: floors to the last extension of the prefix
        assert_eq!(ordinal(&domain, "a\u{e9}"), ordinal(&domain, "a~~"));
    }

    #[test]
    fn test_midpoint_is_between() {
        let domain = StringDomain::new(DEFAULT_STRING_LENGTH).unwrap();
        let lo = ordinal(&domain, "apple");
        let hi = ordinal(&domain, "banana");
        let mid = domain.midpoint(lo, hi);
        let Bound::String(text) = domain.from_ordinal(mid) else {
            panic!("expected a string");
        };
        assert!(text.as_str() > "apple" && text.as_str() < "banana", "{text}");
    }

    #[test]
    fn test_length_limits() {
        assert!(StringDomain::new(0).is_err());
        assert!(StringDomain::new(MAX_STRING_LENGTH + 1).is_err());
        assert!(StringDomain::new(MAX_STRING_LENGTH).is_ok());
    }
}
