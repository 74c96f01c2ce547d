use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use sim_core::{
    EconomyConfig, ProductDef, ResourceDef, SectorConfig, SectorUnitCounts, UnitFlow, UnitType,
};
use sim_econ::{aggregate_counts, price_quote, PricingPolicy};

fn build_config(n_sectors: usize) -> EconomyConfig {
    let mut cfg = EconomyConfig::default();
    for i in 0..n_sectors {
        let resource = format!("Resource{i}");
        let product = format!("Product{i}");
        cfg.resources.insert(
            resource.clone(),
            ResourceDef {
                base_price: Decimal::new(50 + i as i64, 0),
                min_price: Decimal::new(5, 0),
            },
        );
        cfg.products.insert(
            product.clone(),
            ProductDef {
                reference_value: Decimal::new(100 + i as i64, 0),
                min_price: Decimal::new(10, 0),
            },
        );

        let mut sector = SectorConfig::default();
        sector.enabled_units.insert(UnitType::Extraction);
        sector.enabled_units.insert(UnitType::Production);
        sector.enabled_units.insert(UnitType::Retail);
        sector.extractable_resources.insert(resource.clone());
        sector.primary_resource = Some(resource.clone());
        sector.produced_product = Some(product.clone());

        let mut extraction = UnitFlow::default();
        extraction
            .outputs
            .resources
            .insert(resource.clone(), Decimal::new(15, 1));
        sector.flows.insert(UnitType::Extraction, extraction);

        let mut production = UnitFlow::default();
        production
            .inputs
            .resources
            .insert(resource.clone(), Decimal::new(5, 1));
        production
            .outputs
            .products
            .insert(product.clone(), Decimal::ONE);
        sector.flows.insert(UnitType::Production, production);

        let mut retail = UnitFlow::default();
        retail
            .inputs
            .products
            .insert(product.clone(), Decimal::new(8, 1));
        sector.flows.insert(UnitType::Retail, retail);

        cfg.sectors.insert(format!("Sector{i}"), sector);
    }
    cfg
}

fn build_counts(cfg: &EconomyConfig) -> SectorUnitCounts {
    let mut counts = SectorUnitCounts::new();
    for (i, name) in cfg.sectors.keys().enumerate() {
        counts.insert((name.clone(), UnitType::Extraction), 3 + i as i64);
        counts.insert((name.clone(), UnitType::Production), 5 + i as i64);
        counts.insert((name.clone(), UnitType::Retail), 7 + i as i64);
    }
    counts
}

fn bench_aggregate_and_price(c: &mut Criterion) {
    let cfg = build_config(50);
    let counts = build_counts(&cfg);
    let policy = PricingPolicy::default();
    c.bench_function("aggregate 50 sectors + price all items", |b| {
        b.iter(|| {
            let snap = aggregate_counts(black_box(&counts), black_box(&cfg));
            let mut total = Decimal::ZERO;
            for (name, def) in &cfg.resources {
                let quote = price_quote(
                    def.base_price,
                    def.min_price,
                    snap.supply_of(name),
                    snap.demand_of(name),
                    &policy,
                );
                total += quote.current_price;
            }
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_aggregate_and_price);
criterion_main!(benches);
