use anyhow::Result;
use log::info;
use rust_decimal::Decimal;

use crate::base::ParseResult;
use crate::dedup::DuplicateChecker;
use crate::fifo::{calculate_tax, TaxCalculation, TaxRates};
use crate::import::{self, ImportOptions};
use crate::portfolio::{build_portfolio, calculate_holdings, UserPortfolio};
use crate::prices::{Clock, MarketDataProvider, PriceCache, SystemClock, DEFAULT_PRICE_TTL_SECONDS};
use crate::storage::TransactionStore;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tax_rates: TaxRates,
    pub price_ttl_seconds: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax_rates: TaxRates::default(),
            price_ttl_seconds: DEFAULT_PRICE_TTL_SECONDS,
        }
    }
}

/// Facade over the pipeline: parse, deduplicate, persist, and derive
/// portfolio and tax views. Storage and market data are injected
/// collaborators; all computation is synchronous and per-user.
pub struct Engine<S, M> {
    store: S,
    market: M,
    cache: PriceCache,
    clock: Box<dyn Clock>,
    rates: TaxRates,
}

impl<S: TransactionStore, M: MarketDataProvider> Engine<S, M> {
    pub fn new(store: S, market: M) -> Self {
        Self::with_config(store, market, EngineConfig::default())
    }

    pub fn with_config(store: S, market: M, config: EngineConfig) -> Self {
        Self {
            store,
            market,
            cache: PriceCache::new(config.price_ttl_seconds),
            clock: Box::new(SystemClock),
            rates: config.tax_rates,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Parse without persisting, for upload previews.
    pub fn parse_file(&self, bytes: &[u8], filename: &str, options: &ImportOptions) -> ParseResult {
        import::parse_file(bytes, filename, options)
    }

    /// Parses a file, drops candidates already present in the user's
    /// stored history, and persists the remainder. Duplicates are
    /// counted on the result, not persisted.
    pub fn import_file(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ImportOptions,
    ) -> Result<ParseResult> {
        let mut result = import::parse_file(bytes, filename, options);
        if result.transactions.is_empty() {
            return Ok(result);
        }

        let existing = self.store.get_user_transactions(&options.user_id)?;
        let checker = DuplicateChecker::new(&existing);
        let batch = std::mem::take(&mut result.transactions);
        let (fresh, duplicates) = checker.partition(batch);
        result.duplicates = duplicates;
        result.valid_rows = fresh.len();

        if !fresh.is_empty() {
            let ids = self.store.save_transactions_batch(&fresh)?;
            info!(
                "imported {} transactions for {} ({} duplicates skipped)",
                ids.len(),
                options.user_id,
                duplicates
            );
        }
        result.transactions = fresh;
        Ok(result)
    }

    /// Recomputes the user's portfolio from stored history, joins it
    /// with current prices, and caches the snapshot through the store.
    pub fn portfolio(&mut self, user_id: &str) -> Result<UserPortfolio> {
        let transactions = self.store.get_user_transactions(user_id)?;
        let report = calculate_holdings(&transactions);

        let symbols: Vec<String> = report
            .ledgers
            .values()
            .filter(|ledger| ledger.amount > Decimal::ZERO)
            .map(|ledger| ledger.symbol.clone())
            .collect();
        let prices = self
            .cache
            .current_prices(&self.market, &symbols, self.clock.as_ref());

        let portfolio = build_portfolio(user_id, report, &prices, self.clock.now());
        self.store.save_user_portfolio(&portfolio)?;
        Ok(portfolio)
    }

    /// FIFO tax report over the user's full history, scoped to one
    /// tax year.
    pub fn tax_report(&self, user_id: &str, tax_year: i32) -> Result<TaxCalculation> {
        let transactions = self.store.get_user_transactions(user_id)?;
        Ok(calculate_tax(user_id, &transactions, tax_year, &self.rates))
    }
}
