#![deny(warnings)]

//! In-memory reference implementations of the engine's external
//! collaborators: the unit ledger, corporation financial store, share
//! transaction log, audit sinks, and the YAML configuration source.
//!
//! Mutations commit here first; cache invalidation is wired by the
//! caller afterwards, so a failed invalidation can never roll back a
//! committed build.

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    ConfigSource, CorporationFinancials, CorporationId, EconomyConfig, MarketEntry,
    MarketEntryId, SectorUnitCounts, ShareTrade, UnitType,
};
use sim_market::{AuditSink, CorporationStore, ShareTransactionLog, UnitLedger};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Default)]
struct LedgerState {
    next_entry: u64,
    entries: BTreeMap<MarketEntryId, MarketEntry>,
    counts: BTreeMap<(MarketEntryId, UnitType), i64>,
}

/// Authoritative census of market entries and built units.
#[derive(Default)]
pub struct MemoryUnitLedger {
    inner: RwLock<LedgerState>,
}

impl MemoryUnitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, LedgerState>> {
        self.inner.read().map_err(|_| anyhow!("unit ledger poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("unit ledger poisoned"))
    }

    /// Open (or return the existing) market entry for a corporation in a
    /// (state, sector) market.
    pub fn enter_market(
        &self,
        corporation: &CorporationId,
        state_code: &str,
        sector: &str,
    ) -> anyhow::Result<MarketEntryId> {
        let mut state = self.write()?;
        if let Some(existing) = state.entries.values().find(|e| {
            e.corporation == *corporation && e.state_code == state_code && e.sector == sector
        }) {
            return Ok(existing.id);
        }
        state.next_entry += 1;
        let id = MarketEntryId(state.next_entry);
        state.entries.insert(
            id,
            MarketEntry {
                id,
                corporation: corporation.clone(),
                state_code: state_code.to_string(),
                sector: sector.to_string(),
            },
        );
        info!(%corporation, state_code, sector, entry = id.0, "market entered");
        Ok(id)
    }

    /// Remove an entry and all its units. Idempotent.
    pub fn abandon_entry(&self, entry: MarketEntryId) -> anyhow::Result<()> {
        let mut state = self.write()?;
        state.entries.remove(&entry);
        state.counts.retain(|(id, _), _| *id != entry);
        debug!(entry = entry.0, "market entry abandoned");
        Ok(())
    }

    pub fn build_units(
        &self,
        entry: MarketEntryId,
        unit: UnitType,
        count: u32,
    ) -> anyhow::Result<()> {
        let mut state = self.write()?;
        if !state.entries.contains_key(&entry) {
            bail!("no such market entry: {}", entry.0);
        }
        *state.counts.entry((entry, unit)).or_insert(0) += i64::from(count);
        Ok(())
    }

    /// Tear down up to `count` units; the census never drops below zero
    /// through this path.
    pub fn abandon_units(
        &self,
        entry: MarketEntryId,
        unit: UnitType,
        count: u32,
    ) -> anyhow::Result<()> {
        let mut state = self.write()?;
        if let Some(current) = state.counts.get_mut(&(entry, unit)) {
            *current = (*current - i64::from(count)).max(0);
        }
        Ok(())
    }

    /// Raw count override, for exercising upstream-inconsistency paths.
    pub fn set_count(
        &self,
        entry: MarketEntryId,
        unit: UnitType,
        count: i64,
    ) -> anyhow::Result<()> {
        let mut state = self.write()?;
        state.counts.insert((entry, unit), count);
        Ok(())
    }

    pub fn entry(&self, id: MarketEntryId) -> anyhow::Result<Option<MarketEntry>> {
        Ok(self.read()?.entries.get(&id).cloned())
    }

    pub fn entries_for(&self, corporation: &CorporationId) -> anyhow::Result<Vec<MarketEntry>> {
        Ok(self
            .read()?
            .entries
            .values()
            .filter(|e| e.corporation == *corporation)
            .cloned()
            .collect())
    }

    fn aggregate<F>(&self, mut keep: F) -> anyhow::Result<SectorUnitCounts>
    where
        F: FnMut(&MarketEntry) -> bool,
    {
        let state = self.read()?;
        let mut totals = SectorUnitCounts::new();
        for ((entry_id, unit), count) in &state.counts {
            let Some(entry) = state.entries.get(entry_id) else {
                continue;
            };
            if !keep(entry) {
                continue;
            }
            *totals.entry((entry.sector.clone(), *unit)).or_insert(0) += *count;
        }
        Ok(totals)
    }
}

impl UnitLedger for MemoryUnitLedger {
    fn sector_unit_counts(&self) -> anyhow::Result<SectorUnitCounts> {
        self.aggregate(|_| true)
    }

    fn corporation_unit_counts(
        &self,
        corporation: &CorporationId,
    ) -> anyhow::Result<SectorUnitCounts> {
        self.aggregate(|entry| entry.corporation == *corporation)
    }
}

/// Corporation financial aggregates.
#[derive(Default)]
pub struct MemoryCorporationStore {
    inner: RwLock<BTreeMap<CorporationId, CorporationFinancials>>,
}

impl MemoryCorporationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, fin: CorporationFinancials) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow!("corporation store poisoned"))?;
        guard.insert(fin.id.clone(), fin);
        Ok(())
    }
}

impl CorporationStore for MemoryCorporationStore {
    fn financials(
        &self,
        corporation: &CorporationId,
    ) -> anyhow::Result<Option<CorporationFinancials>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("corporation store poisoned"))?;
        Ok(guard.get(corporation).cloned())
    }
}

/// One appended share-price observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Default)]
struct ShareLogState {
    trades: BTreeMap<CorporationId, Vec<ShareTrade>>,
    history: BTreeMap<CorporationId, Vec<PricePoint>>,
}

/// Share transactions plus the append-only share-price history.
#[derive(Default)]
pub struct MemoryShareLog {
    inner: RwLock<ShareLogState>,
}

impl MemoryShareLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, ShareLogState>> {
        self.inner.write().map_err(|_| anyhow!("share log poisoned"))
    }

    pub fn record_trade(
        &self,
        corporation: &CorporationId,
        trade: ShareTrade,
    ) -> anyhow::Result<()> {
        let mut state = self.write()?;
        state
            .trades
            .entry(corporation.clone())
            .or_default()
            .push(trade);
        Ok(())
    }

    /// Append a calculated price to the corporation's history. The log is
    /// append-only; valuations themselves are never persisted.
    pub fn append_price_point(
        &self,
        corporation: &CorporationId,
        at: DateTime<Utc>,
        price: Decimal,
    ) -> anyhow::Result<()> {
        let mut state = self.write()?;
        state
            .history
            .entry(corporation.clone())
            .or_default()
            .push(PricePoint { at, price });
        Ok(())
    }

    pub fn price_history(&self, corporation: &CorporationId) -> anyhow::Result<Vec<PricePoint>> {
        let state = self.inner.read().map_err(|_| anyhow!("share log poisoned"))?;
        Ok(state.history.get(corporation).cloned().unwrap_or_default())
    }
}

impl ShareTransactionLog for MemoryShareLog {
    fn recent_trades(
        &self,
        corporation: &CorporationId,
        limit: usize,
    ) -> anyhow::Result<Vec<ShareTrade>> {
        let state = self.inner.read().map_err(|_| anyhow!("share log poisoned"))?;
        let mut trades = state.trades.get(corporation).cloned().unwrap_or_default();
        trades.sort_by_key(|t| std::cmp::Reverse(t.executed_at));
        trades.truncate(limit);
        Ok(trades)
    }
}

/// Captures audit lines for inspection in tests and tools.
#[derive(Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, line: &str) -> anyhow::Result<()> {
        self.lines
            .lock()
            .map_err(|_| anyhow!("audit sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

/// Forwards each audit line to the tracing pipeline.
#[derive(Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, line: &str) -> anyhow::Result<()> {
        info!(target: "market_audit", "{line}");
        Ok(())
    }
}

/// Loads the economy configuration from a YAML file.
pub struct YamlConfigSource {
    path: PathBuf,
}

impl YamlConfigSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for YamlConfigSource {
    fn load(&self) -> anyhow::Result<EconomyConfig> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let cfg: EconomyConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(cfg)
    }
}
