#![deny(warnings)]

//! Core domain models and invariants for Magnate.
//!
//! This crate defines the serializable types shared across the market
//! simulation: sectors and their unit flows, resource/product tables,
//! the unit census, corporation financial aggregates, and the versioned
//! sector configuration store with explicit cache invalidation.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// Categories of business units a corporation can build inside a market.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum UnitType {
    /// Manufactures the sector's configured product.
    Production,
    /// Sells finished products to consumers.
    Retail,
    /// Provides services; flat-rate economics.
    Service,
    /// Extracts raw resources from the sector's extractable set.
    Extraction,
}

impl UnitType {
    /// All unit types, in a fixed order.
    pub const ALL: [UnitType; 4] = [
        UnitType::Production,
        UnitType::Retail,
        UnitType::Service,
        UnitType::Extraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Production => "production",
            UnitType::Retail => "retail",
            UnitType::Service => "service",
            UnitType::Extraction => "extraction",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw extractable commodity, e.g. "Oil" or "Iron Ore".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Reference price when supply and demand are balanced.
    pub base_price: Decimal,
    /// Hard floor; the computed current price never drops below this.
    pub min_price: Decimal,
}

/// A manufactured good produced by production units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductDef {
    /// Reference value when supply and demand are balanced.
    pub reference_value: Decimal,
    /// Hard floor; the computed current price never drops below this.
    pub min_price: Decimal,
}

/// Per-hour item rates, split by item universe. Quantities are per unit
/// per hour.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRates {
    #[serde(default)]
    pub resources: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub products: BTreeMap<String, Decimal>,
}

impl FlowRates {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.products.is_empty()
    }

    /// Rate for an item regardless of universe (names never collide
    /// across the two tables; see [`validate_economy`]).
    pub fn rate_of(&self, item: &str) -> Option<Decimal> {
        self.resources
            .get(item)
            .or_else(|| self.products.get(item))
            .copied()
    }
}

/// What one unit of a given type consumes and emits per hour.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitFlow {
    #[serde(default)]
    pub inputs: FlowRates,
    #[serde(default)]
    pub outputs: FlowRates,
}

/// Configuration of one sector. Fields default to "absent" so sparse
/// configuration files stay valid: no produced product, no primary
/// resource, nothing extractable, no flows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorConfig {
    /// Unit types corporations may build in this sector. Types outside
    /// this set contribute zero units to every aggregation.
    #[serde(default)]
    pub enabled_units: BTreeSet<UnitType>,
    /// The single product this sector's production units manufacture.
    #[serde(default)]
    pub produced_product: Option<String>,
    /// The sector's headline extractable resource.
    #[serde(default)]
    pub primary_resource: Option<String>,
    /// Resources extraction units in this sector may emit.
    #[serde(default)]
    pub extractable_resources: BTreeSet<String>,
    /// Input/output rates per unit type.
    #[serde(default)]
    pub flows: BTreeMap<UnitType, UnitFlow>,
}

impl SectorConfig {
    /// Flow for a unit type, or `None` when the type is disabled or has
    /// no configured flow. Absence is a valid configuration state, not
    /// an error.
    pub fn flow(&self, unit: UnitType) -> Option<&UnitFlow> {
        if !self.enabled_units.contains(&unit) {
            return None;
        }
        self.flows.get(&unit)
    }
}

/// Flat hourly revenue/cost constants for unit types without item-priced
/// economics. Defaults (per unit per hour): retail 14/6, service 12/5,
/// production fallback 10/4, extraction fallback cost 3.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitEconomics {
    pub retail_revenue_per_hour: Decimal,
    pub retail_cost_per_hour: Decimal,
    pub service_revenue_per_hour: Decimal,
    pub service_cost_per_hour: Decimal,
    pub production_fallback_revenue_per_hour: Decimal,
    pub production_fallback_cost_per_hour: Decimal,
    pub extraction_fallback_cost_per_hour: Decimal,
}

impl Default for UnitEconomics {
    fn default() -> Self {
        Self {
            retail_revenue_per_hour: Decimal::new(14, 0),
            retail_cost_per_hour: Decimal::new(6, 0),
            service_revenue_per_hour: Decimal::new(12, 0),
            service_cost_per_hour: Decimal::new(5, 0),
            production_fallback_revenue_per_hour: Decimal::new(10, 0),
            production_fallback_cost_per_hour: Decimal::new(4, 0),
            extraction_fallback_cost_per_hour: Decimal::new(3, 0),
        }
    }
}

/// The full configuration graph: which sector/unit-type combinations
/// produce or consume which items, at what per-unit rate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default)]
    pub sectors: BTreeMap<String, SectorConfig>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
    #[serde(default)]
    pub products: BTreeMap<String, ProductDef>,
    #[serde(default)]
    pub unit_economics: UnitEconomics,
}

impl EconomyConfig {
    /// Flow for a (sector, unit type) pair; `None` means zero
    /// contribution.
    pub fn flow(&self, sector: &str, unit: UnitType) -> Option<&UnitFlow> {
        self.sectors.get(sector).and_then(|s| s.flow(unit))
    }

    pub fn commodity_names(&self) -> impl Iterator<Item = &String> {
        self.resources.keys()
    }

    pub fn product_names(&self) -> impl Iterator<Item = &String> {
        self.products.keys()
    }
}

/// Unique identifier of a corporation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorporationId(pub String);

impl fmt::Display for CorporationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistent id of a (corporation, state, sector) market entry.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MarketEntryId(pub u64);

/// A corporation's presence in one per-state market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub id: MarketEntryId,
    pub corporation: CorporationId,
    pub state_code: String,
    pub sector: String,
}

/// Economy-wide unit counts keyed by (sector, unit type). Counts are
/// signed: upstream inconsistency can surface negatives, which every
/// consumer clamps to zero before use.
pub type SectorUnitCounts = BTreeMap<(String, UnitType), i64>;

/// Financial aggregates of one corporation, as read from the corporation
/// store. The engine only ever reads snapshots of this state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorporationFinancials {
    pub id: CorporationId,
    pub name: String,
    /// Liquid capital.
    pub capital: Decimal,
    pub total_shares: u64,
    pub public_shares: u64,
    /// Fraction of distributable profit paid out, in [0, 1].
    pub dividend_rate: Decimal,
    /// Profit over the trailing period.
    pub trailing_profit: Decimal,
    /// Length of the trailing period in hours; 0 means unknown.
    pub trailing_hours: u32,
    /// Book cost of built business units.
    pub unit_asset_value: Decimal,
    pub liabilities: Decimal,
}

/// One executed share transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareTrade {
    pub price: Decimal,
    pub quantity: u64,
    pub executed_at: DateTime<Utc>,
}

/// Validation errors for the configuration graph.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Rates are quantities per hour and may not be negative.
    #[error("sector {sector}: negative rate for {item}")]
    NegativeRate { sector: String, item: String },
    /// Prices and floors may not be negative.
    #[error("negative price configured for {0}")]
    NegativeMoney(String),
    /// A flow references an item absent from both item tables.
    #[error("sector {sector}: unknown item {item}")]
    UnknownItem { sector: String, item: String },
    /// Flows may only exist for enabled unit types.
    #[error("sector {sector}: flow configured for disabled unit type {unit}")]
    FlowForDisabledUnit { sector: String, unit: UnitType },
    /// Production units may only emit the sector's produced product.
    #[error("sector {sector}: production emits {item}, not the configured product")]
    UnexpectedProductOutput { sector: String, item: String },
    /// Extraction units may only emit resources from the extractable set.
    #[error("sector {sector}: extraction emits {item} outside the extractable set")]
    UnextractableResource { sector: String, item: String },
    /// The primary resource must itself be extractable.
    #[error("sector {sector}: primary resource {item} is not extractable")]
    PrimaryNotExtractable { sector: String, item: String },
    /// Item names are a single namespace across both tables.
    #[error("item {0} is defined as both a resource and a product")]
    DuplicateItem(String),
    /// Dividend rate must lie in [0, 1].
    #[error("corporation {0}: dividend rate outside [0, 1]")]
    InvalidDividendRate(String),
    /// Public shares cannot exceed total shares.
    #[error("corporation {0}: public shares exceed total shares")]
    SharesOutOfRange(String),
}

fn validate_rates(
    sector: &str,
    cfg: &EconomyConfig,
    rates: &FlowRates,
) -> Result<(), ValidationError> {
    for (item, rate) in rates.resources.iter().chain(rates.products.iter()) {
        if *rate < Decimal::ZERO {
            return Err(ValidationError::NegativeRate {
                sector: sector.to_string(),
                item: item.clone(),
            });
        }
        if !cfg.resources.contains_key(item) && !cfg.products.contains_key(item) {
            return Err(ValidationError::UnknownItem {
                sector: sector.to_string(),
                item: item.clone(),
            });
        }
    }
    Ok(())
}

/// Validate the whole configuration graph, including cross-references
/// between sectors and the item tables.
pub fn validate_economy(cfg: &EconomyConfig) -> Result<(), ValidationError> {
    for (name, def) in &cfg.resources {
        if def.base_price < Decimal::ZERO || def.min_price < Decimal::ZERO {
            return Err(ValidationError::NegativeMoney(name.clone()));
        }
        if cfg.products.contains_key(name) {
            return Err(ValidationError::DuplicateItem(name.clone()));
        }
    }
    for (name, def) in &cfg.products {
        if def.reference_value < Decimal::ZERO || def.min_price < Decimal::ZERO {
            return Err(ValidationError::NegativeMoney(name.clone()));
        }
    }

    let econ = &cfg.unit_economics;
    for (label, value) in [
        ("retail_revenue_per_hour", econ.retail_revenue_per_hour),
        ("retail_cost_per_hour", econ.retail_cost_per_hour),
        ("service_revenue_per_hour", econ.service_revenue_per_hour),
        ("service_cost_per_hour", econ.service_cost_per_hour),
        (
            "production_fallback_revenue_per_hour",
            econ.production_fallback_revenue_per_hour,
        ),
        (
            "production_fallback_cost_per_hour",
            econ.production_fallback_cost_per_hour,
        ),
        (
            "extraction_fallback_cost_per_hour",
            econ.extraction_fallback_cost_per_hour,
        ),
    ] {
        if value < Decimal::ZERO {
            return Err(ValidationError::NegativeMoney(label.to_string()));
        }
    }

    for (sector_name, sector) in &cfg.sectors {
        if let Some(product) = &sector.produced_product {
            if !cfg.products.contains_key(product) {
                return Err(ValidationError::UnknownItem {
                    sector: sector_name.clone(),
                    item: product.clone(),
                });
            }
        }
        for resource in &sector.extractable_resources {
            if !cfg.resources.contains_key(resource) {
                return Err(ValidationError::UnknownItem {
                    sector: sector_name.clone(),
                    item: resource.clone(),
                });
            }
        }
        if let Some(primary) = &sector.primary_resource {
            if !sector.extractable_resources.contains(primary) {
                return Err(ValidationError::PrimaryNotExtractable {
                    sector: sector_name.clone(),
                    item: primary.clone(),
                });
            }
        }
        for (unit, flow) in &sector.flows {
            if !sector.enabled_units.contains(unit) {
                return Err(ValidationError::FlowForDisabledUnit {
                    sector: sector_name.clone(),
                    unit: *unit,
                });
            }
            validate_rates(sector_name, cfg, &flow.inputs)?;
            validate_rates(sector_name, cfg, &flow.outputs)?;
            if *unit == UnitType::Production {
                for item in flow.outputs.products.keys() {
                    if Some(item) != sector.produced_product.as_ref() {
                        return Err(ValidationError::UnexpectedProductOutput {
                            sector: sector_name.clone(),
                            item: item.clone(),
                        });
                    }
                }
            }
            if *unit == UnitType::Extraction {
                for item in flow.outputs.resources.keys() {
                    if !sector.extractable_resources.contains(item) {
                        return Err(ValidationError::UnextractableResource {
                            sector: sector_name.clone(),
                            item: item.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Validate corporation financial aggregates.
pub fn validate_financials(fin: &CorporationFinancials) -> Result<(), ValidationError> {
    if fin.dividend_rate < Decimal::ZERO || fin.dividend_rate > Decimal::ONE {
        return Err(ValidationError::InvalidDividendRate(fin.id.0.clone()));
    }
    if fin.public_shares > fin.total_shares {
        return Err(ValidationError::SharesOutOfRange(fin.id.0.clone()));
    }
    if fin.capital < Decimal::ZERO && fin.liabilities < Decimal::ZERO {
        // Both negative at once is a data bug, not a valid leveraged state.
        return Err(ValidationError::NegativeMoney(fin.id.0.clone()));
    }
    Ok(())
}

/// Origin of the economy configuration (file, database, embedded seed).
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> anyhow::Result<EconomyConfig>;
}

/// Versioned, cached configuration store.
///
/// Loads and validates from its [`ConfigSource`] on first access and
/// serves the cached `Arc` afterwards. [`ConfigStore::invalidate`] must
/// be called whenever the configuration is edited; it drops the cached
/// copy and bumps the version so every derived cache can notice.
pub struct ConfigStore {
    source: Arc<dyn ConfigSource>,
    cached: RwLock<Option<Arc<EconomyConfig>>>,
    version: AtomicU64,
}

impl ConfigStore {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// The cached configuration, loading and validating on a cold cache.
    pub fn get(&self) -> anyhow::Result<Arc<EconomyConfig>> {
        {
            let guard = self
                .cached
                .read()
                .map_err(|_| anyhow!("configuration cache poisoned"))?;
            if let Some(cfg) = guard.as_ref() {
                return Ok(Arc::clone(cfg));
            }
        }
        let loaded = self.source.load()?;
        validate_economy(&loaded)?;
        let cfg = Arc::new(loaded);
        let mut guard = self
            .cached
            .write()
            .map_err(|_| anyhow!("configuration cache poisoned"))?;
        // A concurrent miss may have stored a copy already; either one is
        // a valid load of the same source.
        let stored = guard.get_or_insert_with(|| Arc::clone(&cfg));
        Ok(Arc::clone(stored))
    }

    /// Drop the cached configuration. The next [`ConfigStore::get`]
    /// reloads from the source. Idempotent.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.write() {
            *guard = None;
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        debug!("sector configuration cache invalidated");
    }

    /// Monotonic edit counter; bumped by every invalidation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample_config() -> EconomyConfig {
        let mut cfg = EconomyConfig::default();
        cfg.resources.insert(
            "Oil".into(),
            ResourceDef {
                base_price: dec("75"),
                min_price: dec("10"),
            },
        );
        cfg.resources.insert(
            "Iron Ore".into(),
            ResourceDef {
                base_price: dec("40"),
                min_price: dec("5"),
            },
        );
        cfg.products.insert(
            "Steel".into(),
            ProductDef {
                reference_value: dec("90"),
                min_price: dec("12"),
            },
        );
        cfg.products.insert(
            "Manufactured Goods".into(),
            ProductDef {
                reference_value: dec("150"),
                min_price: dec("20"),
            },
        );

        let mut drilling = SectorConfig::default();
        drilling.enabled_units.insert(UnitType::Extraction);
        drilling.primary_resource = Some("Oil".into());
        drilling.extractable_resources.insert("Oil".into());
        let mut flow = UnitFlow::default();
        flow.outputs.resources.insert("Oil".into(), dec("1.5"));
        drilling.flows.insert(UnitType::Extraction, flow);
        cfg.sectors.insert("Drilling".into(), drilling);

        let mut smelting = SectorConfig::default();
        smelting.enabled_units.insert(UnitType::Production);
        smelting.produced_product = Some("Steel".into());
        let mut flow = UnitFlow::default();
        flow.inputs.resources.insert("Iron Ore".into(), dec("2"));
        flow.outputs.products.insert("Steel".into(), dec("1"));
        smelting.flows.insert(UnitType::Production, flow);
        cfg.sectors.insert("Smelting".into(), smelting);

        let mut manufacturing = SectorConfig::default();
        manufacturing.enabled_units.insert(UnitType::Production);
        manufacturing.enabled_units.insert(UnitType::Retail);
        manufacturing.produced_product = Some("Manufactured Goods".into());
        let mut flow = UnitFlow::default();
        flow.inputs.products.insert("Steel".into(), dec("0.5"));
        flow.inputs.resources.insert("Oil".into(), dec("0.25"));
        flow.outputs
            .products
            .insert("Manufactured Goods".into(), dec("1"));
        manufacturing.flows.insert(UnitType::Production, flow);
        let mut retail_flow = UnitFlow::default();
        retail_flow
            .inputs
            .products
            .insert("Manufactured Goods".into(), dec("0.8"));
        manufacturing.flows.insert(UnitType::Retail, retail_flow);
        cfg.sectors.insert("Manufacturing".into(), manufacturing);

        cfg
    }

    #[test]
    fn sample_config_validates() {
        validate_economy(&sample_config()).unwrap();
    }

    #[test]
    fn serde_roundtrip_config() {
        let cfg = sample_config();
        let s = serde_json::to_string(&cfg).unwrap();
        let back: EconomyConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn flow_lookup_respects_enabled_units() {
        let cfg = sample_config();
        assert!(cfg.flow("Drilling", UnitType::Extraction).is_some());
        // Retail is not enabled for Drilling, so even a configured flow
        // would be invisible.
        assert!(cfg.flow("Drilling", UnitType::Retail).is_none());
        assert!(cfg.flow("Nowhere", UnitType::Retail).is_none());
    }

    #[test]
    fn unknown_flow_item_is_rejected() {
        let mut cfg = sample_config();
        let sector = cfg.sectors.get_mut("Smelting").unwrap();
        sector
            .flows
            .get_mut(&UnitType::Production)
            .unwrap()
            .inputs
            .resources
            .insert("Unobtainium".into(), dec("1"));
        let err = validate_economy(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownItem { .. }));
    }

    #[test]
    fn production_may_only_emit_configured_product() {
        let mut cfg = sample_config();
        let sector = cfg.sectors.get_mut("Smelting").unwrap();
        sector
            .flows
            .get_mut(&UnitType::Production)
            .unwrap()
            .outputs
            .products
            .insert("Manufactured Goods".into(), dec("1"));
        let err = validate_economy(&cfg).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::UnexpectedProductOutput { .. }
        ));
    }

    #[test]
    fn flow_for_disabled_unit_is_rejected() {
        let mut cfg = sample_config();
        let sector = cfg.sectors.get_mut("Drilling").unwrap();
        sector.flows.insert(UnitType::Service, UnitFlow::default());
        let err = validate_economy(&cfg).unwrap_err();
        assert_eq!(
            err,
            ValidationError::FlowForDisabledUnit {
                sector: "Drilling".into(),
                unit: UnitType::Service,
            }
        );
    }

    #[test]
    fn primary_resource_must_be_extractable() {
        let mut cfg = sample_config();
        let sector = cfg.sectors.get_mut("Drilling").unwrap();
        sector.primary_resource = Some("Iron Ore".into());
        let err = validate_economy(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::PrimaryNotExtractable { .. }));
    }

    #[test]
    fn duplicate_item_name_is_rejected() {
        let mut cfg = sample_config();
        cfg.products.insert(
            "Oil".into(),
            ProductDef {
                reference_value: dec("1"),
                min_price: dec("1"),
            },
        );
        let err = validate_economy(&cfg).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateItem("Oil".into()));
    }

    #[test]
    fn financials_validation() {
        let mut fin = CorporationFinancials {
            id: CorporationId("c-1".into()),
            name: "Acme".into(),
            capital: dec("100000"),
            total_shares: 10_000,
            public_shares: 2_500,
            dividend_rate: dec("0.2"),
            trailing_profit: dec("5000"),
            trailing_hours: 720,
            unit_asset_value: dec("40000"),
            liabilities: dec("10000"),
        };
        validate_financials(&fin).unwrap();
        fin.public_shares = 20_000;
        assert!(matches!(
            validate_financials(&fin),
            Err(ValidationError::SharesOutOfRange(_))
        ));
        fin.public_shares = 2_500;
        fin.dividend_rate = dec("1.5");
        assert!(matches!(
            validate_financials(&fin),
            Err(ValidationError::InvalidDividendRate(_))
        ));
    }

    struct CountingSource {
        loads: AtomicUsize,
    }

    impl ConfigSource for CountingSource {
        fn load(&self) -> anyhow::Result<EconomyConfig> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(sample_config())
        }
    }

    #[test]
    fn config_store_caches_until_invalidated() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let store = ConfigStore::new(Arc::clone(&source) as Arc<dyn ConfigSource>);
        assert_eq!(store.version(), 0);
        let a = store.get().unwrap();
        let b = store.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        store.invalidate();
        assert_eq!(store.version(), 1);
        let c = store.get().unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert_eq!(*c, *a);
    }

    struct BrokenSource;

    impl ConfigSource for BrokenSource {
        fn load(&self) -> anyhow::Result<EconomyConfig> {
            let mut cfg = sample_config();
            cfg.sectors
                .get_mut("Drilling")
                .unwrap()
                .extractable_resources
                .insert("Unobtainium".into());
            Ok(cfg)
        }
    }

    #[test]
    fn config_store_rejects_invalid_source() {
        let store = ConfigStore::new(Arc::new(BrokenSource));
        assert!(store.get().is_err());
    }

    proptest! {
        #[test]
        fn negative_rates_always_rejected(rate in -1_000i64..-1) {
            let mut cfg = sample_config();
            let sector = cfg.sectors.get_mut("Smelting").unwrap();
            sector
                .flows
                .get_mut(&UnitType::Production)
                .unwrap()
                .inputs
                .resources
                .insert("Iron Ore".into(), Decimal::new(rate, 2));
            let rejected = matches!(
                validate_economy(&cfg),
                Err(ValidationError::NegativeRate { .. })
            );
            prop_assert!(rejected);
        }

        #[test]
        fn non_negative_rates_accepted(rate in 0i64..1_000_000) {
            let mut cfg = sample_config();
            let sector = cfg.sectors.get_mut("Smelting").unwrap();
            sector
                .flows
                .get_mut(&UnitType::Production)
                .unwrap()
                .inputs
                .resources
                .insert("Iron Ore".into(), Decimal::new(rate, 3));
            prop_assert!(validate_economy(&cfg).is_ok());
        }
    }
}
