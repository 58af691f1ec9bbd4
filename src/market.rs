//! Market identifier: a base asset priced in a quote currency.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered `(quote, base)` currency pair.
///
/// Both symbols are normalized to ASCII uppercase at construction, so
/// equality and hashing are case-insensitive. The canonical string form is
/// `BASE-QUOTE` (e.g. `BTC-EUR`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Market {
    base: String,
    quote: String,
}

impl Market {
    /// Create a market for `base` priced in `quote`.
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        }
    }

    /// The traded asset.
    pub fn base_symbol(&self) -> &str {
        &self.base
    }

    /// The currency the asset is priced in.
    pub fn quote_symbol(&self) -> &str {
        &self.quote
    }

    /// True when the market trades the quote currency against itself
    /// (the "cash" pseudo-market, e.g. `EUR-EUR`).
    pub fn is_quote_currency(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(m: &Market) -> u64 {
        let mut h = DefaultHasher::new();
        m.hash(&mut h);
        h.finish()
    }

    #[test]
    fn normalizes_to_uppercase() {
        let m = Market::new("btc", "eur");
        assert_eq!(m.base_symbol(), "BTC");
        assert_eq!(m.quote_symbol(), "EUR");
    }

    #[test]
    fn equality_is_case_insensitive() {
        assert_eq!(Market::new("btc", "Eur"), Market::new("BTC", "EUR"));
        assert_eq!(
            hash_of(&Market::new("eth", "eur")),
            hash_of(&Market::new("ETH", "EUR"))
        );
    }

    #[test]
    fn canonical_form_is_base_dash_quote() {
        assert_eq!(Market::new("ada", "eur").to_string(), "ADA-EUR");
    }

    #[test]
    fn quote_currency_market() {
        assert!(Market::new("EUR", "EUR").is_quote_currency());
        assert!(!Market::new("BTC", "EUR").is_quote_currency());
    }
}
