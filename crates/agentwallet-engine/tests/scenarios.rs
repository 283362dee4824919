//! End-to-end admission scenarios over the in-memory store

use std::sync::Arc;

use agentwallet_engine::{Engine, TracingNotifier};
use agentwallet_store::{MemStore, Store};
use agentwallet_types::{
    Agent, AgentStatus, AuditDecision, DeadManAction, DeadManConfig, KillSwitch, KillSwitchKind,
    Money, Owner, OwnerId, RuleKind, SpendRule, Transaction, TransactionCandidate,
    TransactionStatus, Wallet, WalletStatus,
};
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::json;

struct World {
    store: Arc<MemStore>,
    engine: Engine,
    owner: Owner,
    agent: Agent,
    wallet: Wallet,
}

async fn world(balance: u64) -> World {
    let store = Arc::new(MemStore::new());
    let owner = Owner {
        id: OwnerId::new(),
        api_key: "owner-key".to_string(),
        name: "operator".to_string(),
        contact: None,
        created_at: Utc::now(),
    };
    let agent = Agent::new(owner.id, "scenario-agent", "agent-key".to_string());
    let mut wallet = Wallet::new(agent.id, "USD");
    wallet.balance = Money::from_major(balance);
    store.create_owner(&owner).await.unwrap();
    store.create_agent(&agent).await.unwrap();
    store.create_wallet(&wallet).await.unwrap();

    let engine = Engine::new(store.clone(), Arc::new(TracingNotifier));
    World {
        store,
        engine,
        owner,
        agent,
        wallet,
    }
}

async fn add_rule(world: &World, kind: RuleKind, priority: i32) {
    let rule = SpendRule::new(world.wallet.id, kind, priority).unwrap();
    world.store.create_rule(&rule).await.unwrap();
}

async fn balance(world: &World) -> Money {
    world
        .store
        .wallet(world.wallet.id)
        .await
        .unwrap()
        .unwrap()
        .balance
}

#[tokio::test]
async fn approval_threshold_flow() {
    let w = world(1000).await;
    add_rule(
        &w,
        RuleKind::ApprovalThreshold {
            threshold: Money::from_major(75),
        },
        10,
    )
    .await;
    add_rule(
        &w,
        RuleKind::PerTransactionLimit {
            limit: Money::from_major(200),
        },
        20,
    )
    .await;

    let outcome = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(80)).with_category("advertising"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status(), TransactionStatus::AwaitingApproval);
    assert_eq!(balance(&w).await, Money::from_major(1000));

    let approved = w
        .engine
        .admission
        .approve(outcome.transaction.id, "operator")
        .await
        .unwrap();
    assert_eq!(approved.status, TransactionStatus::Completed);
    assert!(approved.completed_at.is_some());
    assert_eq!(balance(&w).await, Money::from_major(920));

    // Second submit at the same amount goes back through approval
    let second = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(80)).with_category("advertising"),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), TransactionStatus::AwaitingApproval);

    // Double approval is a state conflict and does not re-debit
    w.engine
        .admission
        .approve(second.transaction.id, "operator")
        .await
        .unwrap();
    let again = w
        .engine
        .admission
        .approve(second.transaction.id, "operator")
        .await;
    assert!(again.is_err());
    assert_eq!(balance(&w).await, Money::from_major(840));
}

#[tokio::test]
async fn hard_rejection_leaves_balance_and_audits() {
    let w = world(1000).await;
    add_rule(
        &w,
        RuleKind::ApprovalThreshold {
            threshold: Money::from_major(75),
        },
        10,
    )
    .await;
    add_rule(
        &w,
        RuleKind::PerTransactionLimit {
            limit: Money::from_major(200),
        },
        20,
    )
    .await;

    let outcome = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(250)).with_category("advertising"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status(), TransactionStatus::Rejected);
    assert_eq!(balance(&w).await, Money::from_major(1000));

    let audits = w
        .store
        .audit_for_resource(&outcome.transaction.id.to_string())
        .await
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].decision, AuditDecision::Blocked);
}

#[tokio::test]
async fn daily_cap_aggregates_completed_spend() {
    let w = world(10_000).await;
    add_rule(
        &w,
        RuleKind::DailyLimit {
            limit: Money::from_major(500),
        },
        0,
    )
    .await;

    for _ in 0..2 {
        let outcome = w
            .engine
            .admission
            .submit(
                w.wallet.id,
                TransactionCandidate::new(Money::from_major(200)).with_category("api"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status(), TransactionStatus::Completed);
    }

    // 400 spent; 150 would project to 550 > 500
    let over = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(150)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(over.status(), TransactionStatus::Rejected);

    // 400 + 50 = 450 stays within the cap
    let within = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(50)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(within.status(), TransactionStatus::Completed);
}

#[tokio::test]
async fn kill_switch_latches_and_blocks_until_reset() {
    let w = world(1000).await;

    // History: one completed 500 spend reconstructs a 1500 peak
    let mut prior = Transaction::from_candidate(
        w.wallet.id,
        &TransactionCandidate::new(Money::from_major(500)).with_category("trading"),
    );
    prior.status = TransactionStatus::Completed;
    prior.completed_at = Some(Utc::now());
    w.store.insert_transaction(&prior).await.unwrap();

    let switch = KillSwitch::new(
        w.wallet.id,
        KillSwitchKind::DrawdownPercent {
            threshold: dec!(0.20),
        },
        24,
    );
    w.store.create_kill_switch(&switch).await.unwrap();

    let outcome = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(10)).with_category("trading"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.status(), TransactionStatus::KillSwitched);
    assert_eq!(balance(&w).await, Money::from_major(1000));
    assert_eq!(
        w.store.wallet(w.wallet.id).await.unwrap().unwrap().status,
        WalletStatus::KillSwitched
    );

    // Any further admission is kill-switched without evaluation
    let next = w
        .engine
        .admission
        .submit(w.wallet.id, TransactionCandidate::new(Money::from_major(1)))
        .await
        .unwrap();
    assert_eq!(next.status(), TransactionStatus::KillSwitched);

    // Operator reset restores admission
    w.engine.kill_switch.reset(switch.id, Utc::now()).await.unwrap();
    let after = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(1)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(after.status(), TransactionStatus::Completed);
}

#[tokio::test]
async fn deadman_velocity_freezes_agent() {
    let w = world(1000).await;
    let mut config = DeadManConfig::new(w.agent.id);
    config.max_tx_per_minute = 3;
    config.on_anomaly = DeadManAction::Freeze;
    w.engine.deadman.register(config).await.unwrap();

    for _ in 0..3 {
        let outcome = w
            .engine
            .admission
            .submit(
                w.wallet.id,
                TransactionCandidate::new(Money::from_major(5)).with_category("api"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status(), TransactionStatus::Completed);
    }

    let fourth = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(5)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(fourth.status(), TransactionStatus::Rejected);
    assert_eq!(
        w.store.agent(w.agent.id).await.unwrap().unwrap().status,
        AgentStatus::Frozen
    );

    // No new admissions succeed until the owner unfreezes
    let blocked = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(5)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(blocked.status(), TransactionStatus::Rejected);

    w.engine.deadman.unfreeze(w.agent.id).await.unwrap();
    // Velocity window still holds recent timestamps, so wait out the minute
    // by evaluating with a later instant via a fresh submit after the window
    // would have drained; here we simply assert the frozen flag cleared.
    assert_eq!(
        w.store.agent(w.agent.id).await.unwrap().unwrap().status,
        AgentStatus::Active
    );
}

#[tokio::test]
async fn spawn_monotonicity_end_to_end() {
    let w = world(1000).await;
    add_rule(
        &w,
        RuleKind::DailyLimit {
            limit: Money::from_major(1000),
        },
        0,
    )
    .await;

    let mut lineage = agentwallet_types::AgentLineage::root(w.agent.id);
    lineage.spawn_policy.max_spend_ratio = dec!(0.5);
    w.store.upsert_lineage(&lineage).await.unwrap();

    let child = Agent::new(w.owner.id, "child", "child-key".to_string());
    w.store.create_agent(&child).await.unwrap();
    let event = w
        .engine
        .spawn
        .spawn(
            w.agent.id,
            child.id,
            agentwallet_types::SpawnOverrides {
                daily_limit: Some(Money::from_major(800)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        event.inherited_policy.daily_limit,
        Some(Money::from_major(500))
    );

    let grandchild = Agent::new(w.owner.id, "grandchild", "gc-key".to_string());
    w.store.create_agent(&grandchild).await.unwrap();
    let event = w
        .engine
        .spawn
        .spawn(
            child.id,
            grandchild.id,
            agentwallet_types::SpawnOverrides::default(),
        )
        .await
        .unwrap();
    assert!(event.inherited_policy.daily_limit.unwrap() <= Money::from_major(500));
}

#[tokio::test]
async fn concurrent_admissions_never_overdraw() {
    let w = world(100).await;

    // Ten concurrent submissions of 30 against a balance of 100: at most
    // three can complete
    let mut handles = Vec::new();
    for _ in 0..10 {
        let admission = w.engine.admission.clone();
        let wallet_id = w.wallet.id;
        handles.push(tokio::spawn(async move {
            admission
                .submit(
                    wallet_id,
                    TransactionCandidate::new(Money::from_major(30)).with_category("api"),
                )
                .await
                .unwrap()
        }));
    }

    let mut completed = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        if outcome.status() == TransactionStatus::Completed {
            completed += 1;
        }
    }
    assert_eq!(completed, 3);
    assert_eq!(balance(&w).await, Money::from_major(10));
}

#[tokio::test]
async fn balance_reconciles_with_completed_transactions() {
    let w = world(0).await;
    w.engine
        .admission
        .deposit(w.wallet.id, Money::from_major(300), None)
        .await
        .unwrap();
    w.engine
        .admission
        .deposit(w.wallet.id, Money::from_major(200), None)
        .await
        .unwrap();

    for amount in [50u64, 75, 25] {
        w.engine
            .admission
            .submit(
                w.wallet.id,
                TransactionCandidate::new(Money::from_major(amount)).with_category("api"),
            )
            .await
            .unwrap();
    }
    // Rejected spend leaves no trace on the balance
    let rejected = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(10_000)).with_category("api"),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), TransactionStatus::Rejected);

    // 500 deposited - 150 spent
    assert_eq!(balance(&w).await, Money::from_major(350));

    // Every completed transaction carries completed_at >= created_at
    let txs = w
        .store
        .transactions_for_wallet(w.wallet.id, 100)
        .await
        .unwrap();
    for tx in txs.iter().filter(|t| t.status == TransactionStatus::Completed) {
        let completed_at = tx.completed_at.expect("completed sets completed_at");
        assert!(tx.created_at <= completed_at);
    }
}

#[tokio::test]
async fn audit_trail_covers_every_outcome() {
    let w = world(100).await;
    add_rule(
        &w,
        RuleKind::PerTransactionLimit {
            limit: Money::from_major(10),
        },
        0,
    )
    .await;

    let ok = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(5)).with_category("api"),
        )
        .await
        .unwrap();
    let rejected = w
        .engine
        .admission
        .submit(
            w.wallet.id,
            TransactionCandidate::new(Money::from_major(50)).with_category("api"),
        )
        .await
        .unwrap();

    for tx in [&ok.transaction, &rejected.transaction] {
        let audits = w
            .store
            .audit_for_resource(&tx.id.to_string())
            .await
            .unwrap();
        assert_eq!(audits.len(), 1, "exactly one audit row per outcome");
    }

    // The rejection's reasoning carries the full rule results
    let audits = w
        .store
        .audit_for_resource(&rejected.transaction.id.to_string())
        .await
        .unwrap();
    assert!(audits[0].reasoning["results"].is_array());
    assert_eq!(audits[0].reasoning["approved"], json!(false));
}
