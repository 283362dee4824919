//! Rules engine
//!
//! Evaluates a wallet's active rules against a candidate transaction in
//! descending priority order. Evaluation never short-circuits: every rule
//! produces a result so the audit trail is complete. `approved` is the
//! conjunction of all blocking rules; `requires_approval` is raised by any
//! ApprovalThreshold rule whose threshold the amount exceeds.

use agentwallet_store::Store;
use agentwallet_types::{
    Money, Result, RuleCheck, RuleEvaluation, RuleKind, SpendRule, TransactionCandidate, WalletId,
};
use chrono::{DateTime, Timelike, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::windows::SpendWindows;

#[derive(Clone)]
pub struct RulesEngine {
    store: Arc<dyn Store>,
    windows: SpendWindows,
}

impl RulesEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            windows: SpendWindows::new(store.clone()),
            store,
        }
    }

    /// Evaluate all active rules for the wallet at the given instant
    pub async fn evaluate(
        &self,
        wallet: WalletId,
        candidate: &TransactionCandidate,
        at: DateTime<Utc>,
    ) -> Result<RuleEvaluation> {
        let mut rules: Vec<SpendRule> = self
            .store
            .rules_for_wallet(wallet)
            .await?
            .into_iter()
            .filter(|r| r.active)
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        let mut results = Vec::with_capacity(rules.len());
        let mut approved = true;
        let mut requires_approval = false;

        for rule in &rules {
            let check = self.check_rule(rule, wallet, candidate, at).await?;
            if let RuleKind::ApprovalThreshold { threshold } = &rule.kind {
                if candidate.amount > *threshold {
                    requires_approval = true;
                }
            } else if !check.passed {
                approved = false;
            }
            results.push(check);
        }

        Ok(RuleEvaluation {
            approved,
            requires_approval,
            results,
            evaluated_at: at,
        })
    }

    async fn check_rule(
        &self,
        rule: &SpendRule,
        wallet: WalletId,
        candidate: &TransactionCandidate,
        at: DateTime<Utc>,
    ) -> Result<RuleCheck> {
        let amount = candidate.amount;
        let (passed, reason, details) = match &rule.kind {
            RuleKind::PerTransactionLimit { limit } => {
                let passed = amount <= *limit;
                (
                    passed,
                    if passed {
                        format!("amount {amount} within per-transaction limit {limit}")
                    } else {
                        format!("amount {amount} exceeds per-transaction limit {limit}")
                    },
                    json!({ "limit": limit, "amount": amount }),
                )
            }
            RuleKind::DailyLimit { limit } => {
                let spent = self.windows.daily(wallet, at).await?;
                window_check(spent, amount, *limit, "daily")?
            }
            RuleKind::WeeklyLimit { limit } => {
                let spent = self.windows.weekly(wallet, at).await?;
                window_check(spent, amount, *limit, "weekly")?
            }
            RuleKind::MonthlyLimit { limit } => {
                let spent = self.windows.monthly(wallet, at).await?;
                window_check(spent, amount, *limit, "monthly")?
            }
            RuleKind::CategoryWhitelist { categories } => match &candidate.category {
                None => (true, "no category on transaction".to_string(), json!({})),
                Some(category) => {
                    let passed = categories.contains(category);
                    (
                        passed,
                        if passed {
                            format!("category '{category}' is whitelisted")
                        } else {
                            format!("category '{category}' not in whitelist")
                        },
                        json!({ "category": category }),
                    )
                }
            },
            RuleKind::CategoryBlacklist { categories } => match &candidate.category {
                None => (true, "no category on transaction".to_string(), json!({})),
                Some(category) => {
                    let passed = !categories.contains(category);
                    (
                        passed,
                        if passed {
                            format!("category '{category}' not blacklisted")
                        } else {
                            format!("category '{category}' is blacklisted")
                        },
                        json!({ "category": category }),
                    )
                }
            },
            RuleKind::RecipientWhitelist { recipients } => match &candidate.recipient_id {
                None => (true, "no recipient on transaction".to_string(), json!({})),
                Some(recipient) => {
                    let passed = recipients.contains(recipient);
                    (
                        passed,
                        if passed {
                            format!("recipient '{recipient}' is whitelisted")
                        } else {
                            format!("recipient '{recipient}' not in whitelist")
                        },
                        json!({ "recipient": recipient }),
                    )
                }
            },
            RuleKind::RecipientBlacklist { recipients } => match &candidate.recipient_id {
                None => (true, "no recipient on transaction".to_string(), json!({})),
                Some(recipient) => {
                    let passed = !recipients.contains(recipient);
                    (
                        passed,
                        if passed {
                            format!("recipient '{recipient}' not blacklisted")
                        } else {
                            format!("recipient '{recipient}' is blacklisted")
                        },
                        json!({ "recipient": recipient }),
                    )
                }
            },
            RuleKind::TimeWindow {
                start_hour,
                end_hour,
            } => {
                let hour = at.hour() as u8;
                // Half-open [start, end); a window with start > end wraps midnight
                let passed = if start_hour <= end_hour {
                    hour >= *start_hour && hour < *end_hour
                } else {
                    hour >= *start_hour || hour < *end_hour
                };
                (
                    passed,
                    if passed {
                        format!("hour {hour} within window [{start_hour}, {end_hour})")
                    } else {
                        format!("hour {hour} outside window [{start_hour}, {end_hour})")
                    },
                    json!({ "hour": hour, "start_hour": start_hour, "end_hour": end_hour }),
                )
            }
            RuleKind::ApprovalThreshold { threshold } => {
                let flagged = amount > *threshold;
                (
                    true,
                    if flagged {
                        format!("amount {amount} above approval threshold {threshold}")
                    } else {
                        format!("amount {amount} within approval threshold {threshold}")
                    },
                    json!({ "threshold": threshold, "requires_approval": flagged }),
                )
            }
            RuleKind::SignalFilter { allowed_signals } => {
                let signal = candidate
                    .metadata
                    .get("signalStrength")
                    .and_then(|v| v.as_str());
                match signal {
                    Some(signal) => {
                        let passed = allowed_signals.iter().any(|s| s == signal);
                        (
                            passed,
                            if passed {
                                format!("signal strength '{signal}' allowed")
                            } else {
                                format!("signal strength '{signal}' not allowed")
                            },
                            json!({ "signal": signal }),
                        )
                    }
                    None => (
                        false,
                        "transaction carries no signal strength".to_string(),
                        json!({}),
                    ),
                }
            }
        };

        Ok(RuleCheck {
            rule_id: rule.id,
            kind: rule.kind.name().to_string(),
            passed,
            reason,
            details,
        })
    }

}

fn window_check(
    spent: Money,
    amount: Money,
    limit: Money,
    label: &str,
) -> Result<(bool, String, serde_json::Value)> {
    let projected = spent.checked_add(amount)?;
    let passed = projected <= limit;
    Ok((
        passed,
        if passed {
            format!("projected {label} spend {projected} within limit {limit}")
        } else {
            format!("projected {label} spend {projected} exceeds limit {limit}")
        },
        json!({ "spent": spent, "projected": projected, "limit": limit }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwallet_store::MemStore;
    use agentwallet_types::{
        Agent, OwnerId, Transaction, TransactionStatus, Wallet,
    };
    use chrono::TimeZone;

    async fn setup() -> (Arc<MemStore>, RulesEngine, WalletId) {
        let store = Arc::new(MemStore::new());
        let agent = Agent::new(OwnerId::new(), "rules-test", "key".to_string());
        let mut wallet = Wallet::new(agent.id, "USD");
        wallet.balance = Money::from_major(1000);
        store.create_agent(&agent).await.unwrap();
        store.create_wallet(&wallet).await.unwrap();
        let engine = RulesEngine::new(store.clone());
        (store, engine, wallet.id)
    }

    async fn add_rule(store: &MemStore, wallet: WalletId, kind: RuleKind, priority: i32) {
        let rule = SpendRule::new(wallet, kind, priority).unwrap();
        store.create_rule(&rule).await.unwrap();
    }

    async fn add_completed(store: &MemStore, wallet: WalletId, amount: Money) {
        let mut tx =
            Transaction::from_candidate(wallet, &TransactionCandidate::new(amount).with_category("api"));
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        store.insert_transaction(&tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_limit_boundary_is_inclusive() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::PerTransactionLimit {
                limit: Money::from_major(200),
            },
            0,
        )
        .await;

        let exact = TransactionCandidate::new(Money::from_major(200));
        let eval = engine.evaluate(wallet, &exact, Utc::now()).await.unwrap();
        assert!(eval.approved);

        let over = TransactionCandidate::new(Money::from_minor(20001));
        let eval = engine.evaluate(wallet, &over, Utc::now()).await.unwrap();
        assert!(!eval.approved);
    }

    #[tokio::test]
    async fn test_daily_limit_projects_spend() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::DailyLimit {
                limit: Money::from_major(500),
            },
            0,
        )
        .await;
        for _ in 0..3 {
            add_completed(&store, wallet, Money::from_major(200)).await;
        }

        let eval = engine
            .evaluate(wallet, &TransactionCandidate::new(Money::from_major(150)), Utc::now())
            .await
            .unwrap();
        assert!(!eval.approved);
        // Deposits are excluded, so the projection for a smaller amount fails too:
        // 600 already spent today
        let eval = engine
            .evaluate(wallet, &TransactionCandidate::new(Money::from_major(50)), Utc::now())
            .await
            .unwrap();
        assert!(!eval.approved);
    }

    #[tokio::test]
    async fn test_no_short_circuit_every_rule_reported() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::PerTransactionLimit {
                limit: Money::from_major(10),
            },
            100,
        )
        .await;
        add_rule(
            &store,
            wallet,
            RuleKind::CategoryBlacklist {
                categories: vec!["gambling".to_string()],
            },
            50,
        )
        .await;
        add_rule(
            &store,
            wallet,
            RuleKind::ApprovalThreshold {
                threshold: Money::from_major(5),
            },
            10,
        )
        .await;

        let candidate =
            TransactionCandidate::new(Money::from_major(20)).with_category("gambling");
        let eval = engine.evaluate(wallet, &candidate, Utc::now()).await.unwrap();

        assert_eq!(eval.results.len(), 3);
        assert!(!eval.approved);
        assert!(eval.requires_approval);
        assert_eq!(eval.failure_reasons().len(), 2);
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::DailyLimit {
                limit: Money::from_major(100),
            },
            1,
        )
        .await;
        add_rule(
            &store,
            wallet,
            RuleKind::PerTransactionLimit {
                limit: Money::from_major(100),
            },
            99,
        )
        .await;

        let eval = engine
            .evaluate(wallet, &TransactionCandidate::new(Money::from_major(10)), Utc::now())
            .await
            .unwrap();
        assert_eq!(eval.results[0].kind, "per_transaction_limit");
        assert_eq!(eval.results[1].kind, "daily_limit");
    }

    #[tokio::test]
    async fn test_time_window_half_open() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::TimeWindow {
                start_hour: 9,
                end_hour: 17,
            },
            0,
        )
        .await;

        let candidate = TransactionCandidate::new(Money::from_major(1));
        let at_9 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        assert!(engine.evaluate(wallet, &candidate, at_9).await.unwrap().approved);

        let at_17 = Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap();
        assert!(!engine.evaluate(wallet, &candidate, at_17).await.unwrap().approved);
    }

    #[tokio::test]
    async fn test_time_window_wraps_midnight() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::TimeWindow {
                start_hour: 22,
                end_hour: 4,
            },
            0,
        )
        .await;

        let candidate = TransactionCandidate::new(Money::from_major(1));
        let at_23 = Utc.with_ymd_and_hms(2025, 6, 2, 23, 0, 0).unwrap();
        assert!(engine.evaluate(wallet, &candidate, at_23).await.unwrap().approved);

        let at_12 = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        assert!(!engine.evaluate(wallet, &candidate, at_12).await.unwrap().approved);
    }

    #[tokio::test]
    async fn test_signal_filter_requires_signal() {
        let (store, engine, wallet) = setup().await;
        add_rule(
            &store,
            wallet,
            RuleKind::SignalFilter {
                allowed_signals: vec!["strong".to_string()],
            },
            0,
        )
        .await;

        let bare = TransactionCandidate::new(Money::from_major(1));
        assert!(!engine.evaluate(wallet, &bare, Utc::now()).await.unwrap().approved);

        let tagged = TransactionCandidate::new(Money::from_major(1))
            .with_metadata(json!({ "signalStrength": "strong" }));
        assert!(engine.evaluate(wallet, &tagged, Utc::now()).await.unwrap().approved);
    }
}
