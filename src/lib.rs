//! Crypto transaction ingestion and cost-basis engine.
//!
//! Exchange export files (CSV, spreadsheet, PDF statements) are
//! normalized into canonical transactions, deduplicated against stored
//! history, and replayed into two independent views: a weighted-average
//! holdings ledger for live portfolio display and a FIFO tax-lot ledger
//! for capital-gains reporting. Storage and market data are injected
//! collaborators; the transaction list is the source of truth and every
//! derived artifact is recomputable.

pub mod base;
mod binance;
mod coinbase;
pub mod dedup;
pub mod detect;
pub mod engine;
pub mod fifo;
mod generic;
pub mod import;
mod kraken;
pub mod number;
mod pdf;
pub mod portfolio;
pub mod prices;
pub mod storage;
mod spreadsheet;
pub mod time;

pub use base::{
    CostBasisMethod, MapError, ParseResult, RowIssue, Severity, Transaction, TransactionType,
};
pub use dedup::DuplicateChecker;
pub use detect::{detect_exchange_format, ExchangeFormat};
pub use engine::{Engine, EngineConfig};
pub use fifo::{calculate_tax, LotDisposal, TaxCalculation, TaxRates, TaxTreatment};
pub use import::{parse_file, ImportOptions};
pub use portfolio::{
    build_portfolio, calculate_holdings, Holding, LedgerReport, SymbolLedger, UserPortfolio,
};
pub use prices::{Clock, MarketDataProvider, PriceCache, Quote, SystemClock};
pub use storage::{MemoryStore, TransactionStore};
