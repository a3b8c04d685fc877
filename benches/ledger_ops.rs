use std::sync::Arc;

use ad_rewards_server::{
    clock::SystemClock,
    config::Config,
    handlers::AppState,
    models::{CreateWithdrawalRequest, Identity, WithdrawalMethod},
    services::{Access, MemberAccess},
    store::MemoryStore,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn state(daily_ad_limit: u32) -> AppState {
    let mut config = Config::for_tests();
    config.rules.daily_ad_limit = daily_ad_limit;
    AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
}

fn member(rt: &Runtime, state: &AppState) -> MemberAccess {
    let identity = Identity {
        uid: Uuid::new_v4(),
        email: format!("bench-{}@example.com", Uuid::new_v4()),
    };
    let ledger = rt
        .block_on(state.ledgers.ensure_ledger(&identity))
        .expect("Failed to create ledger");
    match Access::resolve(&identity, &ledger) {
        Access::Member(member) => member,
        Access::Admin(_) => unreachable!("bench accounts are never the admin email"),
    }
}

fn bench_watch_ad(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let state = state(u32::MAX);
    let member = member(&rt, &state);

    c.bench_function("watch_ad", |b| {
        b.iter(|| {
            rt.block_on(state.rewards.watch_ad(black_box(&member)))
                .expect("watch_ad failed")
        })
    });
}

fn bench_create_request(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let state = state(u32::MAX);
    let member = member(&rt, &state);

    c.bench_function("create_withdrawal_request", |b| {
        b.iter(|| {
            // Refill so the balance never runs dry mid-measurement.
            for _ in 0..20 {
                rt.block_on(state.rewards.watch_ad(&member)).expect("watch_ad failed");
            }
            let request = CreateWithdrawalRequest {
                amount: Decimal::from(100),
                method: WithdrawalMethod::Easypaisa,
                account_info: "03001234567".to_string(),
            };
            rt.block_on(state.withdrawals.create_request(black_box(&member), request))
                .expect("create_request failed")
        })
    });
}

fn bench_admin_queue(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let state = state(u32::MAX);
    let member = member(&rt, &state);
    let admin = {
        let identity = Identity {
            uid: Uuid::new_v4(),
            email: "admin@pkr.com".to_string(),
        };
        let ledger = rt
            .block_on(state.ledgers.ensure_ledger(&identity))
            .expect("Failed to create ledger");
        match Access::resolve(&identity, &ledger) {
            Access::Admin(admin) => admin,
            Access::Member(_) => unreachable!("admin email resolves to admin"),
        }
    };

    for _ in 0..500 {
        for _ in 0..20 {
            rt.block_on(state.rewards.watch_ad(&member)).expect("watch_ad failed");
        }
        let request = CreateWithdrawalRequest {
            amount: Decimal::from(100),
            method: WithdrawalMethod::Jazzcash,
            account_info: "03001234567".to_string(),
        };
        rt.block_on(state.withdrawals.create_request(&member, request))
            .expect("create_request failed");
    }

    c.bench_function("admin_queue_500", |b| {
        b.iter(|| rt.block_on(state.withdrawals.admin_queue(black_box(&admin))).expect("admin_queue failed"))
    });
}

criterion_group!(benches, bench_watch_ad, bench_create_request, bench_admin_queue);
criterion_main!(benches);
