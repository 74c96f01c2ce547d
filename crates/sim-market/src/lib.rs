#![deny(warnings)]

//! Market data service for Magnate: the single read path for "what is
//! the current supply, demand, and price of every resource and product",
//! plus the valuation service layered over the corporation stores.
//!
//! The service caches one summary per item universe for a short TTL.
//! Reads are lock-free lookups; a miss recomputes synchronously within
//! the requesting call. Concurrent misses may duplicate the computation,
//! which is pure, so the last writer's value is as valid as any other.
//! Staleness is bounded by the TTL and pre-empted by explicit
//! invalidation after census mutations.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    ConfigStore, CorporationFinancials, CorporationId, EconomyConfig, SectorUnitCounts,
    ShareTrade, UnitType,
};
use sim_econ::{
    aggregate_counts, balance_sheet, calculate_stock_price, entry_financials, price_quote,
    product_demand_for_sector, BalanceSheet, PeriodFinancials, PriceBook, PricingPolicy,
    SupplyDemandSnapshot, Valuation, ValuationPolicy,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Injected time source so tests advance time deterministically instead
/// of sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and tools.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = instant,
            Err(poisoned) => *poisoned.into_inner() = instant,
        }
    }

    pub fn advance(&self, by: Duration) {
        match self.now.write() {
            Ok(mut guard) => *guard = *guard + by,
            Err(poisoned) => {
                let guard = poisoned.into_inner();
                let next = *guard + by;
                drop(guard);
                self.set(next);
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Authoritative census of built business units.
pub trait UnitLedger: Send + Sync {
    /// Economy-wide counts keyed by (sector, unit type).
    fn sector_unit_counts(&self) -> anyhow::Result<SectorUnitCounts>;
    /// Counts scoped to one corporation, same keying.
    fn corporation_unit_counts(&self, corporation: &CorporationId)
        -> anyhow::Result<SectorUnitCounts>;
}

/// Financial aggregates per corporation.
pub trait CorporationStore: Send + Sync {
    fn financials(&self, corporation: &CorporationId)
        -> anyhow::Result<Option<CorporationFinancials>>;
}

/// Ordered recent share transactions per corporation.
pub trait ShareTransactionLog: Send + Sync {
    /// Most recent trades first, at most `limit` records.
    fn recent_trades(
        &self,
        corporation: &CorporationId,
        limit: usize,
    ) -> anyhow::Result<Vec<ShareTrade>>;
}

/// Append-only sink for audit findings: one line per checked item plus a
/// start and end marker per run.
pub trait AuditSink: Send + Sync {
    fn record(&self, line: &str) -> anyhow::Result<()>;
}

/// Typed failure conditions of the market and valuation services. Pure
/// computation never fails; these arise only at collaborator boundaries
/// or from caller errors, and callers react differently to each.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("corporation not found: {0}")]
    CorporationNotFound(String),
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("market cache lock poisoned")]
    Poisoned,
}

/// The two item universes, cached independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Universe {
    Commodity,
    Product,
}

impl Universe {
    pub const ALL: [Universe; 2] = [Universe::Commodity, Universe::Product];

    pub fn as_str(&self) -> &'static str {
        match self {
            Universe::Commodity => "commodity",
            Universe::Product => "product",
        }
    }
}

/// One item's supply, demand, and price, all derived from the same
/// aggregation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item: String,
    pub supply: Decimal,
    pub demand: Decimal,
    pub price: Decimal,
}

/// Full-universe snapshot with per-item figures and economy totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub entries: Vec<ItemSnapshot>,
    pub total_supply: Decimal,
    pub total_demand: Decimal,
}

impl MarketSummary {
    pub fn entry(&self, item: &str) -> Option<&ItemSnapshot> {
        self.entries.iter().find(|e| e.item == item)
    }
}

struct CachedSummary {
    computed_at: DateTime<Utc>,
    summary: Arc<MarketSummary>,
}

#[derive(Default)]
struct UniverseCache {
    commodity: Option<CachedSummary>,
    product: Option<CachedSummary>,
}

impl UniverseCache {
    fn slot(&self, universe: Universe) -> &Option<CachedSummary> {
        match universe {
            Universe::Commodity => &self.commodity,
            Universe::Product => &self.product,
        }
    }

    fn slot_mut(&mut self, universe: Universe) -> &mut Option<CachedSummary> {
        match universe {
            Universe::Commodity => &mut self.commodity,
            Universe::Product => &mut self.product,
        }
    }
}

fn build_summary(
    universe: Universe,
    cfg: &EconomyConfig,
    snapshot: &SupplyDemandSnapshot,
    pricing: &PricingPolicy,
) -> MarketSummary {
    let defs: Vec<(&String, Decimal, Decimal)> = match universe {
        Universe::Commodity => cfg
            .resources
            .iter()
            .map(|(name, def)| (name, def.base_price, def.min_price))
            .collect(),
        Universe::Product => cfg
            .products
            .iter()
            .map(|(name, def)| (name, def.reference_value, def.min_price))
            .collect(),
    };
    let mut entries = Vec::with_capacity(defs.len());
    let mut total_supply = Decimal::ZERO;
    let mut total_demand = Decimal::ZERO;
    for (name, reference, floor) in defs {
        let supply = snapshot.supply_of(name);
        let demand = snapshot.demand_of(name);
        let quote = price_quote(reference, floor, supply, demand, pricing);
        total_supply += supply;
        total_demand += demand;
        entries.push(ItemSnapshot {
            item: name.clone(),
            supply,
            demand,
            price: quote.current_price,
        });
    }
    MarketSummary {
        entries,
        total_supply,
        total_demand,
    }
}

/// Report from one detail-vs-summary consistency pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub checked: usize,
    pub discrepancies: Vec<String>,
}

/// Orchestrates census reads, aggregation, and pricing behind a
/// TTL-bounded per-universe cache.
pub struct MarketDataService {
    config: Arc<ConfigStore>,
    ledger: Arc<dyn UnitLedger>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    pricing: PricingPolicy,
    cache: RwLock<UniverseCache>,
}

impl MarketDataService {
    pub fn new(
        config: Arc<ConfigStore>,
        ledger: Arc<dyn UnitLedger>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            config,
            ledger,
            clock,
            ttl,
            pricing,
            cache: RwLock::new(UniverseCache::default()),
        }
    }

    pub fn commodity_summary(&self) -> Result<Arc<MarketSummary>, MarketError> {
        self.summary(Universe::Commodity)
    }

    pub fn product_summary(&self) -> Result<Arc<MarketSummary>, MarketError> {
        self.summary(Universe::Product)
    }

    /// Summary for one universe, served from cache while fresh.
    pub fn summary(&self, universe: Universe) -> Result<Arc<MarketSummary>, MarketError> {
        let now = self.clock.now();
        {
            let guard = self.cache.read().map_err(|_| MarketError::Poisoned)?;
            if let Some(cached) = guard.slot(universe) {
                if now - cached.computed_at < self.ttl {
                    return Ok(Arc::clone(&cached.summary));
                }
            }
        }
        let summary = Arc::new(self.compute_summary(universe)?);
        debug!(universe = universe.as_str(), "market summary recomputed");
        let mut guard = self.cache.write().map_err(|_| MarketError::Poisoned)?;
        *guard.slot_mut(universe) = Some(CachedSummary {
            computed_at: now,
            summary: Arc::clone(&summary),
        });
        Ok(summary)
    }

    pub fn commodity_detail(&self, item: &str) -> Result<ItemSnapshot, MarketError> {
        self.detail(Universe::Commodity, item)
    }

    pub fn product_detail(&self, item: &str) -> Result<ItemSnapshot, MarketError> {
        self.detail(Universe::Product, item)
    }

    /// Single-item view derived from the cached summary. A cold cache
    /// triggers a full summary computation, preserving cross-item
    /// consistency.
    pub fn detail(&self, universe: Universe, item: &str) -> Result<ItemSnapshot, MarketError> {
        let summary = self.summary(universe)?;
        summary
            .entry(item)
            .cloned()
            .ok_or_else(|| MarketError::UnknownItem(item.to_string()))
    }

    /// Item -> current price across both universes, for the business
    /// unit calculator.
    pub fn price_book(&self) -> Result<PriceBook, MarketError> {
        let mut book = PriceBook::default();
        for universe in Universe::ALL {
            for entry in &self.summary(universe)?.entries {
                book.insert(entry.item.clone(), entry.price);
            }
        }
        Ok(book)
    }

    /// Drop both cached universes. Called after every unit-count-affecting
    /// mutation (build, abandon, enter/exit market). Idempotent and
    /// best-effort: the triggering mutation has already committed, so a
    /// failure here must be logged by the caller but never escalated;
    /// the cache self-heals at the next TTL expiry.
    pub fn invalidate_all(&self) -> Result<(), MarketError> {
        let mut guard = self.cache.write().map_err(|_| MarketError::Poisoned)?;
        *guard = UniverseCache::default();
        debug!("market cache invalidated");
        Ok(())
    }

    fn compute_summary(&self, universe: Universe) -> Result<MarketSummary, MarketError> {
        let cfg = self
            .config
            .get()
            .map_err(|e| MarketError::Config(e.to_string()))?;
        let counts = self
            .ledger
            .sector_unit_counts()
            .map_err(|e| MarketError::Store(e.to_string()))?;
        let snapshot = aggregate_counts(&counts, &cfg);
        Ok(build_summary(universe, &cfg, &snapshot, &self.pricing))
    }

    /// Total demand the named sector's units contribute toward an item,
    /// from the current census. Unknown sectors contribute zero.
    pub fn total_product_demand(
        &self,
        sector: &str,
        item: &str,
    ) -> Result<Decimal, MarketError> {
        let cfg = self
            .config
            .get()
            .map_err(|e| MarketError::Config(e.to_string()))?;
        let Some(sector_cfg) = cfg.sectors.get(sector) else {
            return Ok(Decimal::ZERO);
        };
        let counts = self
            .ledger
            .sector_unit_counts()
            .map_err(|e| MarketError::Store(e.to_string()))?;
        let by_unit = counts_for_sector(&counts, sector);
        Ok(product_demand_for_sector(sector_cfg, item, &by_unit))
    }

    /// Revenue/cost of one corporation's units in one sector over a
    /// period, priced from the current (cached) market summaries.
    pub fn corporation_entry_financials(
        &self,
        corporation: &CorporationId,
        sector: &str,
        period_hours: u32,
    ) -> Result<PeriodFinancials, MarketError> {
        let cfg = self
            .config
            .get()
            .map_err(|e| MarketError::Config(e.to_string()))?;
        let Some(sector_cfg) = cfg.sectors.get(sector) else {
            return Ok(PeriodFinancials::default());
        };
        let counts = self
            .ledger
            .corporation_unit_counts(corporation)
            .map_err(|e| MarketError::Store(e.to_string()))?;
        let by_unit = counts_for_sector(&counts, sector);
        let prices = self.price_book()?;
        Ok(entry_financials(
            sector_cfg,
            &by_unit,
            &prices,
            &cfg.unit_economics,
            period_hours,
        ))
    }

    /// Recompute an independent aggregation pass and compare it
    /// item-by-item against the summaries currently served to callers.
    /// A discrepancy indicates a caching or aggregation bug, never an
    /// expected game event. Sink write failures are logged and swallowed;
    /// they must not fail the read path that triggered the audit.
    pub fn validate_and_audit(&self, sink: &dyn AuditSink) -> Result<AuditReport, MarketError> {
        let record = |line: &str| {
            if let Err(err) = sink.record(line) {
                warn!(%err, "audit sink write failed");
            }
        };

        let cfg = self
            .config
            .get()
            .map_err(|e| MarketError::Config(e.to_string()))?;
        let counts = self
            .ledger
            .sector_unit_counts()
            .map_err(|e| MarketError::Store(e.to_string()))?;
        let snapshot = aggregate_counts(&counts, &cfg);

        let mut report = AuditReport::default();
        record("audit start");
        for universe in Universe::ALL {
            let served = self.summary(universe)?;
            let fresh = build_summary(universe, &cfg, &snapshot, &self.pricing);
            for expected in &fresh.entries {
                report.checked += 1;
                match served.entry(&expected.item) {
                    Some(actual) if actual == expected => {
                        record(&format!(
                            "{} {} supply={} demand={} price={} ok",
                            universe.as_str(),
                            expected.item,
                            expected.supply,
                            expected.demand,
                            expected.price
                        ));
                    }
                    Some(actual) => {
                        let line = format!(
                            "{} {} served supply={} demand={} price={} recomputed supply={} demand={} price={} mismatch",
                            universe.as_str(),
                            expected.item,
                            actual.supply,
                            actual.demand,
                            actual.price,
                            expected.supply,
                            expected.demand,
                            expected.price
                        );
                        warn!(item = %expected.item, "market audit discrepancy");
                        record(&line);
                        report.discrepancies.push(line);
                    }
                    None => {
                        let line = format!(
                            "{} {} missing from served summary",
                            universe.as_str(),
                            expected.item
                        );
                        warn!(item = %expected.item, "market audit discrepancy");
                        record(&line);
                        report.discrepancies.push(line);
                    }
                }
            }
        }
        record(&format!(
            "audit end checked={} discrepancies={}",
            report.checked,
            report.discrepancies.len()
        ));
        Ok(report)
    }
}

fn counts_for_sector(counts: &SectorUnitCounts, sector: &str) -> BTreeMap<UnitType, i64> {
    counts
        .iter()
        .filter(|((s, _), _)| s == sector)
        .map(|((_, unit), &count)| (*unit, count))
        .collect()
}

/// Stock valuation over the corporation store and share transaction log.
pub struct ValuationService {
    corporations: Arc<dyn CorporationStore>,
    trades: Arc<dyn ShareTransactionLog>,
    clock: Arc<dyn Clock>,
    policy: ValuationPolicy,
}

impl ValuationService {
    /// Trades fetched from the log per valuation; the recency window
    /// inside the policy decides how many are actually considered.
    const TRADE_FETCH_LIMIT: usize = 50;

    pub fn new(
        corporations: Arc<dyn CorporationStore>,
        trades: Arc<dyn ShareTransactionLog>,
        clock: Arc<dyn Clock>,
        policy: ValuationPolicy,
    ) -> Self {
        Self {
            corporations,
            trades,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &ValuationPolicy {
        &self.policy
    }

    /// Blended stock price for one corporation. Missing corporations are
    /// a typed error so trade execution can reject the trade; missing
    /// trade history is not an error, the valuation falls back to
    /// fundamentals.
    pub fn stock_price(&self, corporation: &CorporationId) -> Result<Valuation, MarketError> {
        let fin = self
            .corporations
            .financials(corporation)
            .map_err(|e| MarketError::Store(e.to_string()))?
            .ok_or_else(|| MarketError::CorporationNotFound(corporation.0.clone()))?;
        let trades = self
            .trades
            .recent_trades(corporation, Self::TRADE_FETCH_LIMIT)
            .map_err(|e| MarketError::Store(e.to_string()))?;
        Ok(calculate_stock_price(
            &fin,
            &trades,
            self.clock.now(),
            &self.policy,
        ))
    }

    /// Asset/liability/equity breakdown feeding the book value.
    pub fn balance_sheet(&self, corporation: &CorporationId) -> Result<BalanceSheet, MarketError> {
        let fin = self
            .corporations
            .financials(corporation)
            .map_err(|e| MarketError::Store(e.to_string()))?
            .ok_or_else(|| MarketError::CorporationNotFound(corporation.0.clone()))?;
        Ok(balance_sheet(&fin))
    }
}
