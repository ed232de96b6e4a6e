use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, NaiveDateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A live quote from the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub change_24h: Decimal,
}

/// Market-data collaborator contract. Implementations live outside the
/// engine; lookups are batched to amortize round trips.
pub trait MarketDataProvider {
    /// Current quotes for the given symbols. Symbols the provider does
    /// not know may simply be absent from the response.
    fn current_prices(&self, symbols: &[String]) -> Result<Vec<Quote>>;

    /// Historical price at an instant, `None` when unknown.
    fn price_at(&self, symbol: &str, instant: NaiveDateTime) -> Result<Option<Decimal>>;
}

/// Time source, injectable so cache expiry is testable.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

struct CachedQuote {
    quote: Quote,
    fetched_at: NaiveDateTime,
}

/// Short-TTL quote cache in front of the provider. Advisory only: a
/// failed live call falls back to the last known quotes instead of
/// failing the portfolio computation.
pub struct PriceCache {
    ttl: Duration,
    entries: HashMap<String, CachedQuote>,
}

pub const DEFAULT_PRICE_TTL_SECONDS: i64 = 60;

impl PriceCache {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds),
            entries: HashMap::new(),
        }
    }

    /// Resolves prices for the given symbols: fresh cache entries are
    /// served directly, the rest go to the provider in one batch. A
    /// zero or missing price means "unknown" and is left out of the
    /// map. On provider failure stale entries are served as last-known
    /// quotes.
    pub fn current_prices(
        &mut self,
        provider: &dyn MarketDataProvider,
        symbols: &[String],
        clock: &dyn Clock,
    ) -> HashMap<String, Decimal> {
        let now = clock.now();
        let mut resolved = HashMap::new();
        let mut misses = Vec::new();

        for symbol in symbols {
            match self.entries.get(symbol) {
                Some(entry) if now - entry.fetched_at < self.ttl => {
                    if entry.quote.price > Decimal::ZERO {
                        resolved.insert(symbol.clone(), entry.quote.price);
                    }
                }
                _ => misses.push(symbol.clone()),
            }
        }

        if misses.is_empty() {
            return resolved;
        }

        match provider.current_prices(&misses) {
            Ok(quotes) => {
                for quote in quotes {
                    if quote.price > Decimal::ZERO {
                        resolved.insert(quote.symbol.clone(), quote.price);
                    }
                    self.entries.insert(
                        quote.symbol.clone(),
                        CachedQuote {
                            quote,
                            fetched_at: now,
                        },
                    );
                }
            }
            Err(err) => {
                warn!("price lookup failed, serving last known quotes: {}", err);
                for symbol in &misses {
                    if let Some(entry) = self.entries.get(symbol) {
                        if entry.quote.price > Decimal::ZERO {
                            resolved.insert(symbol.clone(), entry.quote.price);
                        }
                    }
                }
            }
        }
        resolved
    }
}
