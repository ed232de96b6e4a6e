use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::base::{Transaction, TransactionType};

/// Running weighted-average position for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolLedger {
    pub symbol: String,
    pub amount: Decimal,
    pub total_invested: Decimal,
    pub average_cost: Decimal,
    pub realized_gain_loss: Decimal,
}

/// Output of the cost-basis replay: one ledger per symbol (fully
/// liquidated symbols included, their realized gain still counts) plus
/// data-quality warnings raised along the way.
#[derive(Debug, Clone, Default)]
pub struct LedgerReport {
    pub ledgers: BTreeMap<String, SymbolLedger>,
    pub warnings: Vec<String>,
}

/// One asset line of a [`UserPortfolio`]. Market-dependent fields are
/// `None` when no usable quote exists; an unknown price is never
/// reported as a zero valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub amount: Decimal,
    pub average_cost: Decimal,
    pub total_invested: Decimal,
    pub realized_gain_loss: Decimal,
    pub current_price: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub unrealized_gain_loss: Option<Decimal>,
    pub gain_loss_percent: Option<Decimal>,
    pub allocation: Option<Decimal>,
}

/// Derived, recomputable portfolio snapshot. The transaction list stays
/// authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPortfolio {
    pub user_id: String,
    pub holdings: Vec<Holding>,
    pub total_value: Decimal,
    pub total_invested: Decimal,
    pub total_realized_gain_loss: Decimal,
    pub total_unrealized_gain_loss: Decimal,
    /// Realized plus unrealized gains combined. Unpriced holdings
    /// contribute no unrealized component rather than counting as a
    /// total loss.
    pub total_gains: Decimal,
    pub total_gains_percent: Option<Decimal>,
    pub warnings: Vec<String>,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Default)]
struct Position {
    amount: Decimal,
    invested: Decimal,
    average_cost: Decimal,
    realized: Decimal,
}

impl Position {
    fn acquire(&mut self, amount: Decimal, cost: Decimal) {
        self.amount += amount;
        self.invested += cost;
        self.refresh_average();
    }

    /// Removes `requested` units at the running average cost. Sells
    /// realize proceeds minus basis; transfers move basis out without
    /// realizing anything.
    fn dispose(
        &mut self,
        symbol: &str,
        requested: Decimal,
        price: Decimal,
        fee: Decimal,
        realizes_gain: bool,
        warnings: &mut Vec<String>,
    ) {
        if self.amount <= Decimal::ZERO {
            let message = format!(
                "cannot dispose {} {}: no holdings available, skipping",
                requested, symbol
            );
            warn!("{}", message);
            warnings.push(message);
            return;
        }

        let disposed = requested.min(self.amount);
        if disposed < requested {
            let message = format!(
                "oversell of {}: requested {}, only {} held, processing the available amount",
                symbol, requested, self.amount
            );
            warn!("{}", message);
            warnings.push(message);
        }

        let cost_basis = disposed * self.average_cost;
        if realizes_gain {
            let proceeds = disposed * price - fee;
            self.realized += proceeds - cost_basis;
        }
        self.amount -= disposed;
        self.invested = (self.invested - cost_basis).max(Decimal::ZERO);
        self.refresh_average();
    }

    fn refresh_average(&mut self) {
        // Held at its last value once the position is emptied
        if self.amount > Decimal::ZERO {
            self.average_cost = self.invested / self.amount;
        }
    }
}

/// Replays a user's full history chronologically and derives per-symbol
/// weighted-average cost bases and realized gains. The sort is stable,
/// so same-instant transactions keep their insertion order.
pub fn calculate_holdings(transactions: &[Transaction]) -> LedgerReport {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.timestamp);

    let mut positions: HashMap<String, Position> = HashMap::new();
    let mut warnings = Vec::new();

    for tx in ordered {
        let position = positions.entry(tx.symbol.clone()).or_default();
        match tx.tx_type {
            TransactionType::Buy => {
                position.acquire(tx.amount, tx.amount * tx.price + tx.fee);
            }
            TransactionType::Trade => {
                // Negative-amount trades are sells in some exports;
                // mapped rows are always positive but stored history
                // is replayed as found
                if tx.amount >= Decimal::ZERO {
                    position.acquire(tx.amount, tx.amount * tx.price + tx.fee);
                } else {
                    position.dispose(&tx.symbol, -tx.amount, tx.price, tx.fee, true, &mut warnings);
                }
            }
            TransactionType::Stake
            | TransactionType::Reward
            | TransactionType::Airdrop
            | TransactionType::Mining
            | TransactionType::DefiYield => {
                // Income recognized at fair-market value
                position.acquire(tx.amount, tx.amount * tx.price);
            }
            TransactionType::TransferIn => {
                let cost = if tx.price > Decimal::ZERO {
                    tx.amount * tx.price
                } else {
                    tx.total_value
                };
                position.acquire(tx.amount, cost);
            }
            TransactionType::Sell => {
                position.dispose(&tx.symbol, tx.amount, tx.price, tx.fee, true, &mut warnings);
            }
            TransactionType::TransferOut => {
                // Moves cost basis out without realizing gain; the gain
                // is deferred until the asset is sold elsewhere
                position.dispose(
                    &tx.symbol,
                    tx.amount,
                    tx.price,
                    Decimal::ZERO,
                    false,
                    &mut warnings,
                );
            }
            TransactionType::Other => {}
        }
    }

    let ledgers = positions
        .into_iter()
        .map(|(symbol, position)| {
            let ledger = SymbolLedger {
                symbol: symbol.clone(),
                amount: position.amount,
                total_invested: position.invested,
                average_cost: position.average_cost,
                realized_gain_loss: position.realized,
            };
            (symbol, ledger)
        })
        .collect();

    LedgerReport { ledgers, warnings }
}

/// Joins the cost-basis ledgers with live quotes into a portfolio
/// snapshot. Symbols liquidated to zero contribute their realized gain
/// but no holding line; a missing or zero quote leaves the
/// market-dependent fields unset.
pub fn build_portfolio(
    user_id: &str,
    report: LedgerReport,
    prices: &HashMap<String, Decimal>,
    generated_at: NaiveDateTime,
) -> UserPortfolio {
    let total_realized: Decimal = report
        .ledgers
        .values()
        .map(|ledger| ledger.realized_gain_loss)
        .sum();

    let mut holdings = Vec::new();
    let mut total_value = Decimal::ZERO;
    let mut total_invested = Decimal::ZERO;
    let mut total_unrealized = Decimal::ZERO;

    for ledger in report.ledgers.into_values() {
        if ledger.amount <= Decimal::ZERO {
            continue;
        }
        total_invested += ledger.total_invested;

        let current_price = prices
            .get(&ledger.symbol)
            .copied()
            .filter(|price| *price > Decimal::ZERO);
        let current_value = current_price.map(|price| ledger.amount * price);
        let unrealized = current_value.map(|value| value - ledger.total_invested);
        let gain_loss_percent = unrealized.and_then(|gain| {
            if ledger.total_invested > Decimal::ZERO {
                Some(gain / ledger.total_invested * Decimal::ONE_HUNDRED)
            } else {
                None
            }
        });

        if let Some(value) = current_value {
            total_value += value;
        }
        if let Some(gain) = unrealized {
            total_unrealized += gain;
        }

        holdings.push(Holding {
            symbol: ledger.symbol,
            amount: ledger.amount,
            average_cost: ledger.average_cost,
            total_invested: ledger.total_invested,
            realized_gain_loss: ledger.realized_gain_loss,
            current_price,
            current_value,
            unrealized_gain_loss: unrealized,
            gain_loss_percent,
            allocation: None,
        });
    }

    if total_value > Decimal::ZERO {
        for holding in &mut holdings {
            holding.allocation = holding
                .current_value
                .map(|value| value / total_value * Decimal::ONE_HUNDRED);
        }
    }

    let total_gains = total_realized + total_unrealized;
    let total_gains_percent = if total_invested > Decimal::ZERO {
        Some(total_gains / total_invested * Decimal::ONE_HUNDRED)
    } else {
        None
    };

    UserPortfolio {
        user_id: user_id.to_owned(),
        holdings,
        total_value,
        total_invested,
        total_realized_gain_loss: total_realized,
        total_unrealized_gain_loss: total_unrealized,
        total_gains,
        total_gains_percent,
        warnings: report.warnings,
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn tx(
        day: u32,
        tx_type: TransactionType,
        symbol: &str,
        amount: Decimal,
        price: Decimal,
    ) -> Transaction {
        let mut tx = Transaction::new(at(day), tx_type, symbol.to_owned(), amount);
        tx.price = price;
        tx.total_value = amount * price;
        tx
    }

    #[test]
    fn test_weighted_average_cost() {
        // 1 BTC @ 40k, 1 BTC @ 50k: average 45k
        let history = vec![
            tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000)),
            tx(2, TransactionType::Buy, "BTC", dec!(1), dec!(50000)),
        ];
        let report = calculate_holdings(&history);
        let btc = &report.ledgers["BTC"];

        assert_eq!(btc.amount, dec!(2));
        assert_eq!(btc.total_invested, dec!(90000));
        assert_eq!(btc.average_cost, dec!(45000));
        assert_eq!(btc.realized_gain_loss, Decimal::ZERO);
    }

    #[test]
    fn test_fee_enters_cost_basis_and_reduces_proceeds() {
        let mut buy = tx(1, TransactionType::Buy, "ETH", dec!(10), dec!(2000));
        buy.fee = dec!(20);
        let mut sell = tx(2, TransactionType::Sell, "ETH", dec!(5), dec!(2500));
        sell.fee = dec!(10);

        let report = calculate_holdings(&[buy, sell]);
        let eth = &report.ledgers["ETH"];

        // invested 20020, average 2002; proceeds 12500-10, basis 10010
        assert_eq!(eth.average_cost, dec!(2002));
        assert_eq!(eth.realized_gain_loss, dec!(2480));
        assert_eq!(eth.amount, dec!(5));
        assert_eq!(eth.total_invested, dec!(10010));
    }

    #[test]
    fn test_oversell_processes_available_and_warns() {
        let history = vec![
            tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000)),
            tx(2, TransactionType::Sell, "BTC", dec!(2), dec!(50000)),
        ];
        let report = calculate_holdings(&history);
        let btc = &report.ledgers["BTC"];

        assert_eq!(btc.amount, Decimal::ZERO);
        assert_eq!(btc.total_invested, Decimal::ZERO);
        // Only the held unit realizes gain
        assert_eq!(btc.realized_gain_loss, dec!(10000));
        assert!(report.warnings.iter().any(|w| w.contains("oversell")));
    }

    #[test]
    fn test_sell_with_no_holdings_is_skipped() {
        let history = vec![tx(1, TransactionType::Sell, "BTC", dec!(1), dec!(50000))];
        let report = calculate_holdings(&history);
        let btc = &report.ledgers["BTC"];

        assert_eq!(btc.amount, Decimal::ZERO);
        assert_eq!(btc.realized_gain_loss, Decimal::ZERO);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_income_recognized_at_fair_value() {
        let history = vec![tx(1, TransactionType::Reward, "ATOM", dec!(10), dec!(9))];
        let report = calculate_holdings(&history);
        let atom = &report.ledgers["ATOM"];

        assert_eq!(atom.amount, dec!(10));
        assert_eq!(atom.total_invested, dec!(90));
        assert_eq!(atom.average_cost, dec!(9));
    }

    #[test]
    fn test_transfer_out_realizes_no_gain() {
        let history = vec![
            tx(1, TransactionType::Buy, "BTC", dec!(2), dec!(40000)),
            tx(2, TransactionType::TransferOut, "BTC", dec!(1), dec!(60000)),
        ];
        let report = calculate_holdings(&history);
        let btc = &report.ledgers["BTC"];

        assert_eq!(btc.amount, dec!(1));
        assert_eq!(btc.total_invested, dec!(40000));
        assert_eq!(btc.realized_gain_loss, Decimal::ZERO);
    }

    #[test]
    fn test_transfer_in_falls_back_to_total_value() {
        let mut transfer = tx(1, TransactionType::TransferIn, "USDC", dec!(100), dec!(0));
        transfer.total_value = dec!(100);
        let report = calculate_holdings(&[transfer]);
        let usdc = &report.ledgers["USDC"];

        assert_eq!(usdc.total_invested, dec!(100));
        assert_eq!(usdc.average_cost, dec!(1));
    }

    #[test]
    fn test_chronological_replay_ignores_input_order() {
        // Sell arrives first in the vector but later in time
        let history = vec![
            tx(5, TransactionType::Sell, "BTC", dec!(1), dec!(50000)),
            tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000)),
        ];
        let report = calculate_holdings(&history);
        let btc = &report.ledgers["BTC"];

        assert_eq!(btc.realized_gain_loss, dec!(10000));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_replay_is_deterministic_over_reruns() {
        let history = vec![
            tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000)),
            tx(2, TransactionType::Reward, "ATOM", dec!(10), dec!(9)),
            // oversell included so warnings are exercised too
            tx(3, TransactionType::Sell, "BTC", dec!(2), dec!(50000)),
        ];
        let first = calculate_holdings(&history);
        let second = calculate_holdings(&history);

        assert_eq!(first.ledgers, second.ledgers);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn test_portfolio_join_with_prices() {
        let history = vec![
            tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000)),
            tx(2, TransactionType::Buy, "DOGE", dec!(1000), dec!(0.1)),
            // ETH fully liquidated: realized survives, holding dropped
            tx(3, TransactionType::Buy, "ETH", dec!(1), dec!(2000)),
            tx(4, TransactionType::Sell, "ETH", dec!(1), dec!(2500)),
        ];
        let report = calculate_holdings(&history);

        let mut prices = HashMap::new();
        prices.insert("BTC".to_owned(), dec!(60000));
        // DOGE quote missing: unknown, not zero

        let portfolio = build_portfolio("user-1", report, &prices, at(10));

        assert_eq!(portfolio.holdings.len(), 2);
        assert_eq!(portfolio.total_realized_gain_loss, dec!(500));
        assert_eq!(portfolio.total_value, dec!(60000));
        assert_eq!(portfolio.total_unrealized_gain_loss, dec!(20000));
        assert_eq!(portfolio.total_invested, dec!(40100));
        // realized 500 + unrealized 20000, over 40100 invested
        assert_eq!(portfolio.total_gains, dec!(20500));
        assert_eq!(
            portfolio.total_gains_percent.map(|p| p.round_dp(2)),
            Some(dec!(51.12))
        );

        let btc = portfolio
            .holdings
            .iter()
            .find(|h| h.symbol == "BTC")
            .unwrap();
        assert_eq!(btc.current_value, Some(dec!(60000)));
        assert_eq!(btc.unrealized_gain_loss, Some(dec!(20000)));
        assert_eq!(btc.gain_loss_percent, Some(dec!(50)));
        assert_eq!(btc.allocation, Some(dec!(100)));

        let doge = portfolio
            .holdings
            .iter()
            .find(|h| h.symbol == "DOGE")
            .unwrap();
        assert_eq!(doge.current_price, None);
        assert_eq!(doge.current_value, None);
        assert_eq!(doge.unrealized_gain_loss, None);
        assert_eq!(doge.allocation, None);
    }

    #[test]
    fn test_zero_price_quote_is_unknown() {
        let history = vec![tx(1, TransactionType::Buy, "BTC", dec!(1), dec!(40000))];
        let report = calculate_holdings(&history);
        let mut prices = HashMap::new();
        prices.insert("BTC".to_owned(), Decimal::ZERO);

        let portfolio = build_portfolio("user-1", report, &prices, at(2));
        assert_eq!(portfolio.holdings[0].current_price, None);
        assert_eq!(portfolio.total_value, Decimal::ZERO);
    }
}
