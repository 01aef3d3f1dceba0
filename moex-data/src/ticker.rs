//! Futures contract ticker to underlying asset code resolution.
//!
//! FORTS contract codes follow `<root><month letter><year digit>` (eg/ `SiH6`, `MIXH6`). Position
//! endpoints are keyed by the root, so a contract code has to be mapped back to it. The mapping
//! is a heuristic over that naming convention and is not guaranteed to be correct for every
//! contract family; roots that are not in the lookup table are resolved by a two character guess
//! and flagged as such.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::warn;

/// Root codes resolved without guessing, in their canonical spelling.
pub const DEFAULT_ROOTS: &[&str] = &[
    "MIX", "RTS", "GLD", "EUR", "Si", "Eu", "RI", "BR", "GD", "MX", "NG", "SR", "GZ", "LK", "VB",
    "ED",
];

/// How an [`Underlying`] code was obtained.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
pub enum Resolution {
    /// Input was already short enough to be a root code.
    #[display("already_root")]
    AlreadyRoot,
    /// Input starts with a root from the lookup table.
    #[display("known")]
    Known,
    /// Input matched nothing in the lookup table; the first two characters were used.
    #[display("guessed")]
    Guessed,
}

/// Underlying asset code resolved from a contract ticker.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
#[display("{code}")]
pub struct Underlying {
    pub code: SmolStr,
    pub resolution: Resolution,
}

impl Underlying {
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// `true` if the code came from the two character fallback rather than the lookup table.
    pub fn is_guess(&self) -> bool {
        self.resolution == Resolution::Guessed
    }
}

/// Maps contract tickers to underlying asset codes using a pluggable table of known roots.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TickerNormalizer {
    roots: Vec<SmolStr>,
}

impl Default for TickerNormalizer {
    fn default() -> Self {
        Self::with_roots(DEFAULT_ROOTS.iter().copied())
    }
}

impl TickerNormalizer {
    /// Construct a normalizer that only knows `roots`.
    pub fn with_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let mut normalizer = Self { roots: Vec::new() };
        roots.into_iter().for_each(|root| normalizer.add_root(root));
        normalizer
    }

    /// Register another known root. Longer roots take precedence over shorter ones.
    pub fn add_root(&mut self, root: impl Into<SmolStr>) {
        let root = root.into();
        if root.is_empty()
            || self
                .roots
                .iter()
                .any(|known| known.eq_ignore_ascii_case(&root))
        {
            return;
        }

        self.roots.push(root);
        self.roots
            .sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    }

    pub fn roots(&self) -> &[SmolStr] {
        &self.roots
    }

    /// Resolve `ticker` to its underlying asset code.
    pub fn normalize(&self, ticker: &str) -> Underlying {
        let ticker = ticker.trim();

        if ticker.chars().count() <= 3 {
            return Underlying {
                code: SmolStr::new(ticker),
                resolution: Resolution::AlreadyRoot,
            };
        }

        if let Some(root) = self.roots.iter().find(|root| starts_with_ignore_case(ticker, root)) {
            return Underlying {
                code: root.clone(),
                resolution: Resolution::Known,
            };
        }

        let code: String = ticker.chars().take(2).collect::<String>().to_uppercase();
        warn!(
            ticker,
            underlying = %code,
            "ticker root not in lookup table, guessing from first two characters"
        );

        Underlying {
            code: SmolStr::new(code),
            resolution: Resolution::Guessed,
        }
    }
}

fn starts_with_ignore_case(ticker: &str, prefix: &str) -> bool {
    ticker
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
            resolution: Resolution,
        }

        let tests = vec![
            TestCase {
                // TC0: already a root code
                input: "Si",
                expected: "Si",
                resolution: Resolution::AlreadyRoot,
            },
            TestCase {
                // TC1: mixed case root from the table keeps its canonical spelling
                input: "SiH6",
                expected: "Si",
                resolution: Resolution::Known,
            },
            TestCase {
                // TC2: three letter root
                input: "MIXH6",
                expected: "MIX",
                resolution: Resolution::Known,
            },
            TestCase {
                // TC3: three letter root wins over the two letter prefix
                input: "RTSM6",
                expected: "RTS",
                resolution: Resolution::Known,
            },
            TestCase {
                // TC4: two letter root that shares a prefix with a three letter one
                input: "MXH6",
                expected: "MX",
                resolution: Resolution::Known,
            },
            TestCase {
                // TC5: lower case input resolves to the canonical root
                input: "brg6",
                expected: "BR",
                resolution: Resolution::Known,
            },
            TestCase {
                // TC6: unknown root is guessed and upper cased
                input: "qzH6",
                expected: "QZ",
                resolution: Resolution::Guessed,
            },
            TestCase {
                // TC7: three characters are never rewritten
                input: "gld",
                expected: "gld",
                resolution: Resolution::AlreadyRoot,
            },
        ];

        let normalizer = TickerNormalizer::default();

        for (index, test) in tests.into_iter().enumerate() {
            let actual = normalizer.normalize(test.input);
            assert_eq!(actual.as_str(), test.expected, "TC{} failed", index);
            assert_eq!(actual.resolution, test.resolution, "TC{} failed", index);
        }
    }

    #[test]
    fn test_guess_is_flagged() {
        let normalizer = TickerNormalizer::with_roots(["MIX"]);

        let actual = normalizer.normalize("SiH6");

        assert_eq!(actual.as_str(), "SI");
        assert!(actual.is_guess());
    }

    #[test]
    fn test_add_root_extends_table() {
        let mut normalizer = TickerNormalizer::with_roots(["MIX"]);
        normalizer.add_root("CNY");
        normalizer.add_root("cny");

        let actual = normalizer.normalize("CNYH6");

        assert_eq!(actual.as_str(), "CNY");
        assert!(!actual.is_guess());
        assert_eq!(normalizer.roots().len(), 2);
    }

    #[test]
    fn test_non_ascii_ticker_does_not_panic() {
        let normalizer = TickerNormalizer::default();

        let actual = normalizer.normalize("Фьючерс");

        assert_eq!(actual.as_str(), "ФЬ");
        assert!(actual.is_guess());
    }
}
