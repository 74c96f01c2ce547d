#![deny(warnings)]

//! Economic engines for Magnate: supply/demand aggregation, scarcity
//! pricing, per-entry business unit economics, and stock valuation.
//!
//! Everything in this crate is a pure function over snapshots. Degenerate
//! inputs (zero supply, zero or negative counts, missing flow entries)
//! have defined numeric outputs and never error; [`EconError`] exists
//! only for invalid tunables.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    CorporationFinancials, EconomyConfig, SectorConfig, SectorUnitCounts, ShareTrade,
    UnitEconomics, UnitType,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const HOURS_PER_YEAR: i64 = 8_760;
const MINUTES_PER_HOUR: i64 = 60;

/// Errors produced by tunable-policy validation.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// The division guard must be strictly positive.
    #[error("epsilon must be strictly positive")]
    InvalidEpsilon,
    /// Fundamental blend weights must lie in [0, 1] and sum to 1.
    #[error("fundamental weights must lie in [0, 1] and sum to 1")]
    InvalidWeights,
    /// Some other tunable is outside its documented range.
    #[error("invalid policy value: {0}")]
    InvalidPolicy(&'static str),
}

/// Economy-wide supply and demand totals, both derived from the same
/// census read. Never patched incrementally; always recomputed wholesale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyDemandSnapshot {
    pub supply: BTreeMap<String, Decimal>,
    pub demand: BTreeMap<String, Decimal>,
}

impl SupplyDemandSnapshot {
    pub fn supply_of(&self, item: &str) -> Decimal {
        self.supply.get(item).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn demand_of(&self, item: &str) -> Decimal {
        self.demand.get(item).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Aggregate unit counts against the configuration graph.
///
/// One pass produces the full supply and demand maps for every configured
/// resource and product: each (sector, unit type) pair adds
/// `count x output_rate` to supply and `count x input_rate` to demand.
/// Negative counts are clamped to zero, missing sectors/flows contribute
/// nothing, and the fold commutes, so iteration order never changes the
/// result.
pub fn aggregate<'a>(
    counts: impl IntoIterator<Item = (&'a (String, UnitType), &'a i64)>,
    cfg: &EconomyConfig,
) -> SupplyDemandSnapshot {
    let mut snapshot = SupplyDemandSnapshot::default();
    for name in cfg.commodity_names().chain(cfg.product_names()) {
        snapshot.supply.insert(name.clone(), Decimal::ZERO);
        snapshot.demand.insert(name.clone(), Decimal::ZERO);
    }

    for ((sector_name, unit), &raw_count) in counts {
        if raw_count < 0 {
            debug!(
                sector = %sector_name,
                unit = %unit,
                count = raw_count,
                "negative unit count clamped to zero"
            );
        }
        let count = raw_count.max(0);
        if count == 0 {
            continue;
        }
        let Some(flow) = cfg.flow(sector_name, *unit) else {
            continue;
        };
        let quantity = Decimal::from(count);
        for (item, rate) in flow.outputs.resources.iter().chain(&flow.outputs.products) {
            if let Some(total) = snapshot.supply.get_mut(item) {
                *total += quantity * *rate;
            }
        }
        for (item, rate) in flow.inputs.resources.iter().chain(&flow.inputs.products) {
            if let Some(total) = snapshot.demand.get_mut(item) {
                *total += quantity * *rate;
            }
        }
    }
    snapshot
}

/// Convenience wrapper over [`aggregate`] for callers holding the map.
pub fn aggregate_counts(counts: &SectorUnitCounts, cfg: &EconomyConfig) -> SupplyDemandSnapshot {
    aggregate(counts, cfg)
}

/// Tunables for the scarcity pricing rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Division guard: the denominator of the scarcity factor is
    /// `max(epsilon, supply)`. Must be strictly positive.
    pub epsilon: Decimal,
    /// Upper bound on the scarcity factor; `None` leaves it unbounded.
    pub scarcity_cap: Option<Decimal>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            epsilon: Decimal::new(1, 2),
            scarcity_cap: Some(Decimal::from(10)),
        }
    }
}

/// Validate a [`PricingPolicy`].
pub fn validate_pricing_policy(policy: &PricingPolicy) -> Result<(), EconError> {
    if policy.epsilon <= Decimal::ZERO {
        return Err(EconError::InvalidEpsilon);
    }
    if let Some(cap) = policy.scarcity_cap {
        if cap <= Decimal::ZERO {
            return Err(EconError::InvalidPolicy("scarcity_cap must be positive"));
        }
    }
    Ok(())
}

/// A priced view of one item at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub current_price: Decimal,
    pub reference_price: Decimal,
    /// demand / max(epsilon, supply), after the configured cap.
    pub scarcity_factor: Decimal,
}

/// Price an item from its supply/demand totals.
///
/// `current_price = max(min_price, reference_price x scarcity_factor)`;
/// monotonically increasing in demand, decreasing in supply, with a hard
/// floor. Negative supply or demand is clamped to zero first.
pub fn price_quote(
    reference_price: Decimal,
    min_price: Decimal,
    supply: Decimal,
    demand: Decimal,
    policy: &PricingPolicy,
) -> PriceQuote {
    let supply = supply.max(Decimal::ZERO);
    let demand = demand.max(Decimal::ZERO);
    // An invalid epsilon would panic on the division below; fall back to
    // the default guard rather than fail a read path.
    let epsilon = if policy.epsilon > Decimal::ZERO {
        policy.epsilon
    } else {
        PricingPolicy::default().epsilon
    };
    let mut scarcity_factor = demand / supply.max(epsilon);
    if let Some(cap) = policy.scarcity_cap {
        scarcity_factor = scarcity_factor.min(cap);
    }
    let current_price = (reference_price * scarcity_factor).max(min_price);
    PriceQuote {
        current_price,
        reference_price,
        scarcity_factor,
    }
}

/// Item -> current price, assembled by the market data service from one
/// summary pass per universe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceBook {
    prices: BTreeMap<String, Decimal>,
}

impl PriceBook {
    pub fn insert(&mut self, item: String, price: Decimal) {
        self.prices.insert(item, price);
    }

    pub fn price_of(&self, item: &str) -> Option<Decimal> {
        self.prices.get(item).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, Decimal)> for PriceBook {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Demand one sector's units contribute toward a named item: the sum over
/// enabled unit types of `input_rate(item) x count`. Counts are clamped
/// to zero, so inconsistent data contributes nothing, never a negative.
pub fn product_demand_for_sector(
    sector: &SectorConfig,
    item: &str,
    counts: &BTreeMap<UnitType, i64>,
) -> Decimal {
    let mut total = Decimal::ZERO;
    for unit in UnitType::ALL {
        let Some(flow) = sector.flow(unit) else {
            continue;
        };
        let Some(rate) = flow.inputs.rate_of(item) else {
            continue;
        };
        let count = counts.get(&unit).copied().unwrap_or(0).max(0);
        total += Decimal::from(count) * rate;
    }
    total
}

/// Revenue and variable costs of one market entry over a period.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodFinancials {
    pub revenue: Decimal,
    pub variable_costs: Decimal,
}

/// Per-entry economics over `period_hours`.
///
/// Retail and service units use the flat hourly constants. Production
/// units price their configured product and inputs from the book, falling
/// back to the flat constants when the sector has no priced produced
/// product. Extraction units price their resource outputs with a flat
/// fallback cost. Missing price entries contribute zero, and counts are
/// clamped to zero first, mirroring the aggregator's clamp policy.
pub fn entry_financials(
    sector: &SectorConfig,
    counts: &BTreeMap<UnitType, i64>,
    prices: &PriceBook,
    econ: &UnitEconomics,
    period_hours: u32,
) -> PeriodFinancials {
    let hours = Decimal::from(period_hours);
    let mut out = PeriodFinancials::default();
    for unit in UnitType::ALL {
        if !sector.enabled_units.contains(&unit) {
            continue;
        }
        let count = counts.get(&unit).copied().unwrap_or(0).max(0);
        if count == 0 {
            continue;
        }
        let unit_hours = Decimal::from(count) * hours;
        match unit {
            UnitType::Retail => {
                out.revenue += econ.retail_revenue_per_hour * unit_hours;
                out.variable_costs += econ.retail_cost_per_hour * unit_hours;
            }
            UnitType::Service => {
                out.revenue += econ.service_revenue_per_hour * unit_hours;
                out.variable_costs += econ.service_cost_per_hour * unit_hours;
            }
            UnitType::Production => {
                let priced = sector.produced_product.as_ref().and_then(|product| {
                    let flow = sector.flow(unit)?;
                    let rate = flow.outputs.products.get(product).copied()?;
                    let price = prices.price_of(product)?;
                    Some((flow, rate * price))
                });
                match priced {
                    Some((flow, hourly_revenue)) => {
                        out.revenue += hourly_revenue * unit_hours;
                        for (item, rate) in
                            flow.inputs.resources.iter().chain(&flow.inputs.products)
                        {
                            let price = prices.price_of(item).unwrap_or(Decimal::ZERO);
                            out.variable_costs += *rate * price * unit_hours;
                        }
                    }
                    None => {
                        out.revenue += econ.production_fallback_revenue_per_hour * unit_hours;
                        out.variable_costs += econ.production_fallback_cost_per_hour * unit_hours;
                    }
                }
            }
            UnitType::Extraction => {
                let mut hourly_revenue = Decimal::ZERO;
                if let Some(flow) = sector.flow(unit) {
                    for (item, rate) in &flow.outputs.resources {
                        if let Some(price) = prices.price_of(item) {
                            hourly_revenue += *rate * price;
                        }
                    }
                }
                out.revenue += hourly_revenue * unit_hours;
                out.variable_costs += econ.extraction_fallback_cost_per_hour * unit_hours;
            }
        }
    }
    out
}

/// Weight given to trade history in the final price blend, as a function
/// of the number of recent trades. Both curves are monotonically
/// non-decreasing and bounded by `max_trade_weight`, so pricing converges
/// toward the trade-weighted figure as history accumulates without ever
/// fully abandoning fundamentals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BlendCurve {
    /// `w = max_trade_weight x min(1, n / full_weight_trades)`.
    CappedLinear {
        full_weight_trades: u32,
        max_trade_weight: Decimal,
    },
    /// `w = max_trade_weight / (1 + exp(-steepness x (n - midpoint)))`.
    Logistic {
        midpoint: f64,
        steepness: f64,
        max_trade_weight: Decimal,
    },
}

impl BlendCurve {
    pub fn trade_weight(&self, recent_trades: u32) -> Decimal {
        match self {
            BlendCurve::CappedLinear {
                full_weight_trades,
                max_trade_weight,
            } => {
                if *full_weight_trades == 0 {
                    return *max_trade_weight;
                }
                let capped = recent_trades.min(*full_weight_trades);
                *max_trade_weight * Decimal::from(capped) / Decimal::from(*full_weight_trades)
            }
            BlendCurve::Logistic {
                midpoint,
                steepness,
                max_trade_weight,
            } => {
                let x = f64::from(recent_trades);
                let logistic = 1.0 / (1.0 + (-steepness * (x - midpoint)).exp());
                let factor = Decimal::from_f64(logistic).unwrap_or(Decimal::ZERO);
                *max_trade_weight * factor
            }
        }
    }

    fn max_trade_weight(&self) -> Decimal {
        match self {
            BlendCurve::CappedLinear {
                max_trade_weight, ..
            }
            | BlendCurve::Logistic {
                max_trade_weight, ..
            } => *max_trade_weight,
        }
    }
}

/// Tunables for stock valuation. The defaults are policy, not business
/// law; tests pin them explicitly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValuationPolicy {
    /// Multiple applied to annualized earnings per share.
    pub earnings_multiple: Decimal,
    pub weight_book: Decimal,
    pub weight_earnings: Decimal,
    pub weight_dividend: Decimal,
    pub weight_cash: Decimal,
    /// Rate capitalizing the annual dividend per share into an implied
    /// value (`dividend / rate`).
    pub dividend_capitalization_rate: Decimal,
    /// Minimum recent trades before trade history is trusted at all.
    pub min_trades: u32,
    /// Recency window for share-trade history, in hours.
    pub trade_window_hours: i64,
    pub blend: BlendCurve,
    /// Hard floor for the calculated share price.
    pub price_floor: Decimal,
}

impl Default for ValuationPolicy {
    fn default() -> Self {
        Self {
            earnings_multiple: Decimal::from(10),
            weight_book: Decimal::new(3, 1),
            weight_earnings: Decimal::new(3, 1),
            weight_dividend: Decimal::new(2, 1),
            weight_cash: Decimal::new(2, 1),
            dividend_capitalization_rate: Decimal::new(5, 2),
            min_trades: 3,
            trade_window_hours: 168,
            blend: BlendCurve::CappedLinear {
                full_weight_trades: 20,
                max_trade_weight: Decimal::new(8, 1),
            },
            price_floor: Decimal::ONE,
        }
    }
}

/// Validate a [`ValuationPolicy`].
pub fn validate_valuation_policy(policy: &ValuationPolicy) -> Result<(), EconError> {
    let weights = [
        policy.weight_book,
        policy.weight_earnings,
        policy.weight_dividend,
        policy.weight_cash,
    ];
    if weights
        .iter()
        .any(|w| *w < Decimal::ZERO || *w > Decimal::ONE)
    {
        return Err(EconError::InvalidWeights);
    }
    if weights.iter().copied().sum::<Decimal>() != Decimal::ONE {
        return Err(EconError::InvalidWeights);
    }
    if policy.dividend_capitalization_rate <= Decimal::ZERO {
        return Err(EconError::InvalidPolicy(
            "dividend_capitalization_rate must be positive",
        ));
    }
    if policy.earnings_multiple < Decimal::ZERO {
        return Err(EconError::InvalidPolicy(
            "earnings_multiple must be non-negative",
        ));
    }
    if policy.min_trades == 0 {
        return Err(EconError::InvalidPolicy("min_trades must be at least 1"));
    }
    if policy.trade_window_hours <= 0 {
        return Err(EconError::InvalidPolicy(
            "trade_window_hours must be positive",
        ));
    }
    if policy.price_floor < Decimal::ZERO {
        return Err(EconError::InvalidPolicy(
            "price_floor must be non-negative",
        ));
    }
    let max_weight = policy.blend.max_trade_weight();
    if max_weight < Decimal::ZERO || max_weight > Decimal::ONE {
        return Err(EconError::InvalidPolicy(
            "max_trade_weight must lie in [0, 1]",
        ));
    }
    Ok(())
}

/// Asset/liability/equity breakdown of one corporation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub cash: Decimal,
    pub unit_assets: Decimal,
    pub total_assets: Decimal,
    pub liabilities: Decimal,
    pub equity: Decimal,
}

/// Sum the corporation's asset categories against its liabilities.
pub fn balance_sheet(fin: &CorporationFinancials) -> BalanceSheet {
    let total_assets = fin.capital + fin.unit_asset_value;
    BalanceSheet {
        cash: fin.capital,
        unit_assets: fin.unit_asset_value,
        total_assets,
        liabilities: fin.liabilities,
        equity: total_assets - fin.liabilities,
    }
}

/// Recency-and-size weighted mean of recent trade prices.
///
/// Each trade inside the window weighs `quantity x (window - age) / window`;
/// trades outside the window (or with zero quantity) are ignored. Returns
/// the weighted price and the number of trades considered.
pub fn trade_weighted_price(
    trades: &[ShareTrade],
    now: DateTime<Utc>,
    window_hours: i64,
) -> (Decimal, u32) {
    if window_hours <= 0 {
        return (Decimal::ZERO, 0);
    }
    let window = Decimal::from(window_hours);
    let mut numerator = Decimal::ZERO;
    let mut denominator = Decimal::ZERO;
    let mut considered = 0u32;
    for trade in trades {
        if trade.quantity == 0 {
            continue;
        }
        let age_minutes = (now - trade.executed_at).num_minutes().max(0);
        let age_hours = Decimal::from(age_minutes) / Decimal::from(MINUTES_PER_HOUR);
        if age_hours > window {
            continue;
        }
        let recency = (window - age_hours) / window;
        let weight = Decimal::from(trade.quantity) * recency;
        if weight <= Decimal::ZERO {
            continue;
        }
        numerator += trade.price * weight;
        denominator += weight;
        considered += 1;
    }
    if denominator <= Decimal::ZERO {
        (Decimal::ZERO, considered)
    } else {
        (numerator / denominator, considered)
    }
}

/// A corporation's blended stock valuation at one instant. Ephemeral:
/// recomputed per request, never persisted as canonical state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub book_value: Decimal,
    pub earnings_value: Decimal,
    pub dividend_yield: Decimal,
    pub cash_per_share: Decimal,
    pub trade_weighted_price: Decimal,
    pub fundamental_value: Decimal,
    pub calculated_price: Decimal,
    pub recent_trade_count: u32,
    pub has_trade_history: bool,
    pub annual_profit: Decimal,
    pub annual_dividend_per_share: Decimal,
}

/// Blend fundamentals with recent trade history into a stock price.
///
/// `fundamental_value` is the weighted blend of book value, earnings
/// value, dividend-implied value, and cash per share, clamped to the
/// price floor. Without sufficient trade history the calculated price is
/// the fundamental value exactly; with history, trade weight grows with
/// the recent trade count along the configured [`BlendCurve`].
pub fn calculate_stock_price(
    fin: &CorporationFinancials,
    trades: &[ShareTrade],
    now: DateTime<Utc>,
    policy: &ValuationPolicy,
) -> Valuation {
    let per_share = |value: Decimal| {
        if fin.total_shares == 0 {
            Decimal::ZERO
        } else {
            value / Decimal::from(fin.total_shares)
        }
    };

    let annual_profit = if fin.trailing_hours == 0 {
        Decimal::ZERO
    } else {
        fin.trailing_profit * Decimal::from(HOURS_PER_YEAR) / Decimal::from(fin.trailing_hours)
    };

    let sheet = balance_sheet(fin);
    let book_value = per_share(sheet.equity);
    let earnings_value = per_share(annual_profit) * policy.earnings_multiple;
    let distributable = annual_profit.max(Decimal::ZERO);
    let annual_dividend_per_share = per_share(distributable * fin.dividend_rate);
    let dividend_value = if policy.dividend_capitalization_rate > Decimal::ZERO {
        annual_dividend_per_share / policy.dividend_capitalization_rate
    } else {
        Decimal::ZERO
    };
    let cash_per_share = per_share(fin.capital);

    let blended = policy.weight_book * book_value
        + policy.weight_earnings * earnings_value
        + policy.weight_dividend * dividend_value
        + policy.weight_cash * cash_per_share;
    let fundamental_value = blended.max(policy.price_floor);

    let (twp, recent_trade_count) =
        trade_weighted_price(trades, now, policy.trade_window_hours);
    let has_trade_history = recent_trade_count >= policy.min_trades;

    let calculated_price = if has_trade_history {
        let weight = policy.blend.trade_weight(recent_trade_count);
        let blend = (Decimal::ONE - weight) * fundamental_value + weight * twp;
        blend.max(policy.price_floor)
    } else {
        fundamental_value
    };

    let dividend_yield = if calculated_price > Decimal::ZERO {
        annual_dividend_per_share / calculated_price
    } else {
        Decimal::ZERO
    };

    Valuation {
        book_value,
        earnings_value,
        dividend_yield,
        cash_per_share,
        trade_weighted_price: twp,
        fundamental_value,
        calculated_price,
        recent_trade_count,
        has_trade_history,
        annual_profit,
        annual_dividend_per_share,
    }
}
