use criterion::{criterion_group, criterion_main, Criterion};
use economy_ledger::{EconomyLedger, ManualClock, MemoryStore, ShopItem};

fn bench_ledger(c: &mut Criterion) {
    let clock = ManualClock::new(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    let mut ledger = EconomyLedger::with_clock(MemoryStore::new(), clock.clone());
    let item = ShopItem {
        id: "hint".into(),
        name: "Hint".into(),
        cost: economy_core::Price { coins: 1, gems: 0 },
    };

    c.bench_function("earn_and_spend", |b| {
        b.iter(|| {
            let _ = ledger.add_coins(5, "bench");
            let _ = ledger.spend_coins(3, "bench");
        })
    });
    c.bench_function("add_xp", |b| b.iter(|| ledger.add_xp(250, "bench")));
    c.bench_function("purchase", |b| b.iter(|| ledger.purchase(&item)));
    c.bench_function("day_rollover", |b| {
        b.iter(|| {
            clock.advance_days(1);
            ledger.evaluate_streak()
        })
    });
}

criterion_group!(benches, bench_ledger);
criterion_main!(benches);
