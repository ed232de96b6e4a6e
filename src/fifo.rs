use std::collections::{HashMap, VecDeque};

use chrono::{Datelike, NaiveDateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::base::{CostBasisMethod, Transaction, TransactionType};

/// Flat tax rates applied to net positive gains per treatment. Actual
/// rate tables are jurisdiction configuration, not engine logic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRates {
    pub short_term: Decimal,
    pub long_term: Decimal,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            short_term: dec!(0.37),
            long_term: dec!(0.15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaxTreatment {
    ShortTerm,
    LongTerm,
}

/// One consumed lot slice: a disposal matched against a specific
/// acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotDisposal {
    pub symbol: String,
    pub acquired_at: NaiveDateTime,
    pub disposed_at: NaiveDateTime,
    pub amount: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub gain_loss: Decimal,
    pub holding_period_days: i64,
    pub tax_treatment: TaxTreatment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCalculation {
    pub user_id: String,
    pub tax_year: i32,
    pub method: CostBasisMethod,
    pub short_term_gains: Decimal,
    pub long_term_gains: Decimal,
    pub total_gains: Decimal,
    pub total_tax_liability: Decimal,
    pub disposals: Vec<LotDisposal>,
    pub warnings: Vec<String>,
    pub created_at: NaiveDateTime,
}

/// An open acquisition lot awaiting disposal.
#[derive(Debug, Clone)]
struct Lot {
    acquired_at: NaiveDateTime,
    remaining: Decimal,
    unit_cost: Decimal,
}

/// Per-symbol FIFO lot queues. Independent from the weighted-average
/// holdings replay; the two views may legitimately report different
/// realized gains.
#[derive(Debug, Default)]
struct LotBook {
    lots: HashMap<String, VecDeque<Lot>>,
}

impl LotBook {
    fn acquire(&mut self, tx: &Transaction) {
        self.lots
            .entry(tx.symbol.clone())
            .or_default()
            .push_back(Lot {
                acquired_at: tx.timestamp,
                remaining: tx.amount,
                unit_cost: tx.price,
            });
    }

    /// Consumes lots oldest-first until the disposed amount is covered,
    /// splitting the front lot when it is larger than needed. An
    /// exhausted queue leaves the remainder unmatched with a warning.
    fn dispose(&mut self, tx: &Transaction, warnings: &mut Vec<String>) -> Vec<LotDisposal> {
        let queue = self.lots.entry(tx.symbol.clone()).or_default();
        let mut outstanding = tx.amount;
        let mut slices = Vec::new();

        while outstanding > Decimal::ZERO {
            let Some(lot) = queue.front_mut() else {
                let message = format!(
                    "disposal of {} {} exceeds acquired lots by {}",
                    tx.amount, tx.symbol, outstanding
                );
                warn!("{}", message);
                warnings.push(message);
                break;
            };

            let slice = outstanding.min(lot.remaining);
            let cost_basis = slice * lot.unit_cost;
            let proceeds = slice * tx.price;
            let holding_period_days = (tx.timestamp - lot.acquired_at).num_days();

            slices.push(LotDisposal {
                symbol: tx.symbol.clone(),
                acquired_at: lot.acquired_at,
                disposed_at: tx.timestamp,
                amount: slice,
                cost_basis,
                proceeds,
                gain_loss: proceeds - cost_basis,
                holding_period_days,
                tax_treatment: if holding_period_days > 365 {
                    TaxTreatment::LongTerm
                } else {
                    TaxTreatment::ShortTerm
                },
            });

            lot.remaining -= slice;
            outstanding -= slice;
            if lot.remaining.is_zero() {
                queue.pop_front();
            }
        }
        slices
    }
}

/// FIFO tax report for one user and tax year.
///
/// The replay covers the user's entire history so that lots acquired in
/// earlier years are available to disposals inside the requested year;
/// only disposal records dated within `tax_year` enter the report and
/// its aggregates.
pub fn calculate_tax(
    user_id: &str,
    transactions: &[Transaction],
    tax_year: i32,
    rates: &TaxRates,
) -> TaxCalculation {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.timestamp);

    let mut book = LotBook::default();
    let mut warnings = Vec::new();
    let mut disposals = Vec::new();

    for tx in ordered {
        match tx.tx_type {
            TransactionType::Buy | TransactionType::TransferIn => book.acquire(tx),
            TransactionType::Sell | TransactionType::TransferOut => {
                let slices = book.dispose(tx, &mut warnings);
                disposals.extend(
                    slices
                        .into_iter()
                        .filter(|slice| slice.disposed_at.year() == tax_year),
                );
            }
            _ => {}
        }
    }

    let short_term_gains: Decimal = disposals
        .iter()
        .filter(|slice| slice.tax_treatment == TaxTreatment::ShortTerm)
        .map(|slice| slice.gain_loss)
        .sum();
    let long_term_gains: Decimal = disposals
        .iter()
        .filter(|slice| slice.tax_treatment == TaxTreatment::LongTerm)
        .map(|slice| slice.gain_loss)
        .sum();
    let total_tax_liability = short_term_gains.max(Decimal::ZERO) * rates.short_term
        + long_term_gains.max(Decimal::ZERO) * rates.long_term;

    TaxCalculation {
        user_id: user_id.to_owned(),
        tax_year,
        method: CostBasisMethod::Fifo,
        short_term_gains,
        long_term_gains,
        total_gains: short_term_gains + long_term_gains,
        total_tax_liability,
        disposals,
        warnings,
        created_at: Utc::now().naive_utc(),
    }
}
