#![deny(warnings)]

//! Headless CLI: seeds a demo economy, founds corporations, builds a unit
//! census, and prints market summaries, an audit report, and a stock
//! valuation.

use anyhow::Result;
use chrono::{Duration, Utc};
use persistence::{
    MemoryCorporationStore, MemoryShareLog, MemoryUnitLedger, TracingAuditSink, YamlConfigSource,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use sim_core::{
    validate_financials, ConfigSource, ConfigStore, CorporationFinancials, CorporationId,
    EconomyConfig, ProductDef, ResourceDef, SectorConfig, ShareTrade, UnitFlow, UnitType,
};
use sim_econ::{PricingPolicy, ValuationPolicy};
use sim_market::{
    Clock, CorporationStore, MarketDataService, MarketSummary, SystemClock, UnitLedger,
    ValuationService,
};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

fn parse_args() -> (Option<String>, u64, u32) {
    let mut config: Option<String> = None;
    let mut seed: u64 = 42;
    let mut period_hours: u32 = 96;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = it.next(),
            "--seed" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    seed = v;
                }
            }
            "--period-hours" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    period_hours = v;
                }
            }
            _ => {}
        }
    }
    (config, seed, period_hours)
}

/// Built-in seed economy, used when no `--config` file is given. Mirrors
/// `assets/economy.yaml`.
struct EmbeddedSource;

impl ConfigSource for EmbeddedSource {
    fn load(&self) -> anyhow::Result<EconomyConfig> {
        Ok(seed_economy())
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().expect("literal decimal")
}

fn seed_economy() -> EconomyConfig {
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
    drilling.enabled_units.insert(UnitType::Service);
    drilling.primary_resource = Some("Oil".into());
    drilling.extractable_resources.insert("Oil".into());
    let mut flow = UnitFlow::default();
    flow.outputs.resources.insert("Oil".into(), dec("1.5"));
    drilling.flows.insert(UnitType::Extraction, flow);
    cfg.sectors.insert("Drilling".into(), drilling);

    let mut mining = SectorConfig::default();
    mining.enabled_units.insert(UnitType::Extraction);
    mining.primary_resource = Some("Iron Ore".into());
    mining.extractable_resources.insert("Iron Ore".into());
    let mut flow = UnitFlow::default();
    flow.outputs.resources.insert("Iron Ore".into(), dec("2"));
    mining.flows.insert(UnitType::Extraction, flow);
    cfg.sectors.insert("Mining".into(), mining);

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
    flow.inputs.resources.insert("Oil".into(), dec("0.25"));
    flow.inputs.products.insert("Steel".into(), dec("0.5"));
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

fn seed_corporations(store: &MemoryCorporationStore) -> Result<(CorporationId, CorporationId)> {
    let acme = CorporationFinancials {
        id: CorporationId("acme".into()),
        name: "Acme Industrial".into(),
        capital: dec("250000"),
        total_shares: 50_000,
        public_shares: 12_500,
        dividend_rate: dec("0.25"),
        trailing_profit: dec("36500"),
        trailing_hours: 2_190,
        unit_asset_value: dec("120000"),
        liabilities: dec("45000"),
    };
    let northwind = CorporationFinancials {
        id: CorporationId("northwind".into()),
        name: "Northwind Holdings".into(),
        capital: dec("90000"),
        total_shares: 20_000,
        public_shares: 5_000,
        dividend_rate: dec("0.1"),
        trailing_profit: dec("4000"),
        trailing_hours: 2_190,
        unit_asset_value: dec("30000"),
        liabilities: dec("15000"),
    };
    validate_financials(&acme)?;
    validate_financials(&northwind)?;
    let acme_id = acme.id.clone();
    let northwind_id = northwind.id.clone();
    store.upsert(acme)?;
    store.upsert(northwind)?;
    Ok((acme_id, northwind_id))
}

/// Enter the demo markets and build a seeded-random number of units for
/// every enabled unit type.
fn seed_census(
    ledger: &MemoryUnitLedger,
    cfg: &EconomyConfig,
    acme: &CorporationId,
    northwind: &CorporationId,
    seed: u64,
) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let plan = [
        (acme, "TX", "Drilling"),
        (acme, "TX", "Manufacturing"),
        (northwind, "CA", "Mining"),
        (northwind, "CA", "Smelting"),
        (northwind, "TX", "Manufacturing"),
    ];
    for (corp, state_code, sector_name) in plan {
        let entry = ledger.enter_market(corp, state_code, sector_name)?;
        let Some(sector) = cfg.sectors.get(sector_name) else {
            continue;
        };
        for unit in &sector.enabled_units {
            let count = rng.gen_range(1..=6u32);
            ledger.build_units(entry, *unit, count)?;
        }
    }
    Ok(())
}

fn print_summary(title: &str, summary: &MarketSummary) {
    println!("{title}");
    println!(
        "  {:<20} {:>12} {:>12} {:>12}",
        "item", "supply", "demand", "price"
    );
    for entry in &summary.entries {
        println!(
            "  {:<20} {:>12} {:>12} {:>12}",
            entry.item, entry.supply, entry.demand, entry.price
        );
    }
    println!(
        "  totals: supply {} | demand {}",
        summary.total_supply, summary.total_demand
    );
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let (config_path, seed, period_hours) = parse_args();
    info!(
        git_sha = env!("GIT_SHA"),
        build_date = env!("BUILD_DATE"),
        ?config_path,
        seed,
        period_hours,
        "starting market cli"
    );

    let source: Arc<dyn ConfigSource> = match &config_path {
        Some(path) => Arc::new(YamlConfigSource::new(path)),
        None => Arc::new(EmbeddedSource),
    };
    let config = Arc::new(ConfigStore::new(source));
    let cfg = config.get()?;

    let ledger = Arc::new(MemoryUnitLedger::new());
    let corporations = Arc::new(MemoryCorporationStore::new());
    let share_log = Arc::new(MemoryShareLog::new());
    let clock = Arc::new(SystemClock);

    let market = MarketDataService::new(
        Arc::clone(&config),
        Arc::clone(&ledger) as Arc<dyn UnitLedger>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        Duration::seconds(5),
        PricingPolicy::default(),
    );

    let (acme, northwind) = seed_corporations(&corporations)?;
    seed_census(&ledger, &cfg, &acme, &northwind, seed)?;
    // The census just mutated: invalidate before the first read. Failure
    // is logged, never fatal; the TTL self-heals.
    if let Err(err) = market.invalidate_all() {
        warn!(%err, "cache invalidation failed after census mutation");
    }

    print_summary("Commodities", &*market.commodity_summary()?);
    print_summary("Products", &*market.product_summary()?);

    let audit = market.validate_and_audit(&TracingAuditSink)?;
    println!(
        "Audit | checked: {} | discrepancies: {}",
        audit.checked,
        audit.discrepancies.len()
    );

    let goods_demand = market.total_product_demand("Manufacturing", "Manufactured Goods")?;
    println!("Manufacturing demand for Manufactured Goods: {goods_demand}/h");

    let acme_mfg = market.corporation_entry_financials(&acme, "Manufacturing", period_hours)?;
    println!(
        "Acme Manufacturing over {}h | revenue: ${} | variable costs: ${}",
        period_hours, acme_mfg.revenue, acme_mfg.variable_costs
    );

    // A few recorded trades so the valuation blends fundamentals with
    // trade history.
    let now = Utc::now();
    for (hours_ago, price, quantity) in [(30i64, "9.80", 400u64), (8, "10.40", 250), (2, "10.10", 600)]
    {
        share_log.record_trade(
            &acme,
            ShareTrade {
                price: dec(price),
                quantity,
                executed_at: now - Duration::hours(hours_ago),
            },
        )?;
    }

    let valuation_service = ValuationService::new(
        Arc::clone(&corporations) as Arc<dyn CorporationStore>,
        Arc::clone(&share_log) as Arc<dyn sim_market::ShareTransactionLog>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        ValuationPolicy::default(),
    );

    for corp in [&acme, &northwind] {
        let sheet = valuation_service.balance_sheet(corp)?;
        let valuation = valuation_service.stock_price(corp)?;
        println!(
            "{} | assets: ${} | liabilities: ${} | equity: ${}",
            corp, sheet.total_assets, sheet.liabilities, sheet.equity
        );
        println!(
            "{} | fundamental: ${} | trade-weighted: ${} | calculated: ${} | trades: {} | history: {}",
            corp,
            valuation.fundamental_value.round_dp(2),
            valuation.trade_weighted_price.round_dp(2),
            valuation.calculated_price.round_dp(2),
            valuation.recent_trade_count,
            valuation.has_trade_history
        );
        share_log.append_price_point(corp, now, valuation.calculated_price)?;
    }

    Ok(())
}
