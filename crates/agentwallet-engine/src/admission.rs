//! Admission controller
//!
//! The single entry point every spend traverses, in a fixed order:
//! preconditions, dead-man switch, kill switch, rules engine, ledger debit,
//! audit. The whole path runs under the wallet's admission lock; any
//! negative gate short-circuits into a persisted transaction with a
//! terminal status. Policy rejections are outcomes, not errors.

use agentwallet_store::Store;
use agentwallet_types::{
    actions, AuditDecision, AuditDraft, Money, Result, RuleEvaluation, Transaction,
    TransactionCandidate, TransactionId, TransactionStatus, Wallet, WalletError, WalletId,
    WalletStatus, DEPOSIT_CATEGORY,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::deadman::{DeadManSwitch, DeadManVerdict};
use crate::killswitch::KillSwitchEngine;
use crate::locks::WalletLocks;
use crate::rules::RulesEngine;

/// Result of one admission
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub transaction: Transaction,
    /// Present when the rules engine ran
    pub evaluation: Option<RuleEvaluation>,
}

impl AdmissionOutcome {
    pub fn status(&self) -> TransactionStatus {
        self.transaction.status
    }
}

pub struct AdmissionController {
    store: Arc<dyn Store>,
    rules: RulesEngine,
    deadman: Arc<DeadManSwitch>,
    kill_switch: Arc<KillSwitchEngine>,
    locks: WalletLocks,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn Store>,
        deadman: Arc<DeadManSwitch>,
        kill_switch: Arc<KillSwitchEngine>,
    ) -> Self {
        Self {
            rules: RulesEngine::new(store.clone()),
            store,
            deadman,
            kill_switch,
            locks: WalletLocks::new(),
        }
    }

    /// Submit a candidate spend
    pub async fn submit(
        &self,
        wallet_id: WalletId,
        candidate: TransactionCandidate,
    ) -> Result<AdmissionOutcome> {
        if !candidate.amount.is_positive() {
            return Err(WalletError::invalid_input("amount", "must be > 0"));
        }
        if candidate.category.as_deref() == Some(DEPOSIT_CATEGORY) {
            return Err(WalletError::invalid_input(
                "category",
                "deposits go through the deposit operation",
            ));
        }

        let lock = self.locks.for_wallet(wallet_id);
        let _guard = lock.lock().await;
        let at = Utc::now();

        let wallet = self
            .store
            .wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            })?;

        let mut tx = Transaction::from_candidate(wallet_id, &candidate);
        debug!(wallet = %wallet_id, tx = %tx.id, amount = %tx.amount, "admission started");

        // Latched wallet: persist as kill-switched without further evaluation
        if wallet.status == WalletStatus::KillSwitched {
            tx.status = TransactionStatus::KillSwitched;
            set_meta(&mut tx, "blocked_by", json!("kill_switch"));
            self.store.insert_transaction(&tx).await?;
            self.audit_outcome(
                &wallet,
                &tx,
                actions::TX_KILLSWITCHED,
                AuditDecision::Blocked,
                json!({ "reason": "wallet is kill-switched" }),
            )
            .await?;
            return Ok(AdmissionOutcome {
                transaction: tx,
                evaluation: None,
            });
        }

        // Remaining preconditions: wallet active, funds cover the amount
        if wallet.status != WalletStatus::Active {
            return self
                .reject(
                    &wallet,
                    tx,
                    format!("wallet is {:?}, not active", wallet.status),
                )
                .await;
        }
        if wallet.balance < candidate.amount {
            return self
                .reject(
                    &wallet,
                    tx,
                    format!(
                        "insufficient funds: requested {}, available {}",
                        candidate.amount, wallet.balance
                    ),
                )
                .await;
        }

        // Dead-man switch gate
        let verdict = self
            .deadman
            .evaluate(
                wallet.agent_id,
                candidate.amount,
                candidate.recipient_id.as_deref(),
                at,
            )
            .await?;
        if let DeadManVerdict::Blocked {
            trigger,
            action,
            reason,
        } = verdict
        {
            set_meta(&mut tx, "blocked_by", json!("dead_man_switch"));
            return self
                .reject(
                    &wallet,
                    tx,
                    format!("dead-man switch ({trigger:?}, {action:?}): {reason}"),
                )
                .await;
        }

        // Kill switch: a switch already latched blocks outright, otherwise
        // evaluate trigger conditions against history; a firing switch
        // latches atomically with this transaction
        if let Some(latched) = self.kill_switch.latched(wallet_id).await? {
            tx.status = TransactionStatus::KillSwitched;
            set_meta(&mut tx, "blocked_by", json!(latched.kind.name()));
            self.store.insert_transaction(&tx).await?;
            self.audit_outcome(
                &wallet,
                &tx,
                actions::TX_KILLSWITCHED,
                AuditDecision::Blocked,
                json!({ "switch_id": latched.id.to_string() }),
            )
            .await?;
            return Ok(AdmissionOutcome {
                transaction: tx,
                evaluation: None,
            });
        }
        tx.status = TransactionStatus::KillSwitched;
        if let Some(switch) = self
            .kill_switch
            .check_and_latch(&wallet, Some(&tx), at)
            .await?
        {
            set_meta(&mut tx, "blocked_by", json!(switch.kind.name()));
            // Latch already persisted the transaction and its audit entry
            self.store.update_transaction(&tx).await?;
            return Ok(AdmissionOutcome {
                transaction: tx,
                evaluation: None,
            });
        }
        tx.status = TransactionStatus::Pending;

        // Rules engine
        let evaluation = self.rules.evaluate(wallet_id, &candidate, at).await?;
        tx.rule_check_results = serde_json::to_value(&evaluation)?;

        if !evaluation.approved {
            tx.status = TransactionStatus::Rejected;
            self.store.insert_transaction(&tx).await?;
            self.audit_outcome(
                &wallet,
                &tx,
                actions::TX_REJECTED,
                AuditDecision::Blocked,
                tx.rule_check_results.clone(),
            )
            .await?;
            return Ok(AdmissionOutcome {
                transaction: tx,
                evaluation: Some(evaluation),
            });
        }

        if evaluation.requires_approval {
            tx.status = TransactionStatus::AwaitingApproval;
            self.store.insert_transaction(&tx).await?;
            self.audit_outcome(
                &wallet,
                &tx,
                actions::TX_AWAITING,
                AuditDecision::Escalated,
                tx.rule_check_results.clone(),
            )
            .await?;
            return Ok(AdmissionOutcome {
                transaction: tx,
                evaluation: Some(evaluation),
            });
        }

        // Approved: debit and complete atomically
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        self.store.debit_and_complete(&tx).await?;
        info!(wallet = %wallet_id, tx = %tx.id, amount = %tx.amount, "transaction completed");
        self.audit_outcome(
            &wallet,
            &tx,
            actions::TX_COMPLETED,
            AuditDecision::Allowed,
            tx.rule_check_results.clone(),
        )
        .await?;
        Ok(AdmissionOutcome {
            transaction: tx,
            evaluation: Some(evaluation),
        })
    }

    /// Operator approval of an awaiting transaction; balance is re-checked
    /// at execute time
    pub async fn approve(&self, id: TransactionId, operator: &str) -> Result<Transaction> {
        let mut tx = self
            .store
            .transaction(id)
            .await?
            .ok_or(WalletError::TransactionNotFound {
                transaction_id: id.to_string(),
            })?;
        if tx.status != TransactionStatus::AwaitingApproval {
            return Err(WalletError::state_conflict(
                "transaction",
                format!("expected awaiting_approval, found {:?}", tx.status),
            ));
        }

        let lock = self.locks.for_wallet(tx.wallet_id);
        let _guard = lock.lock().await;

        let wallet =
            self.store
                .wallet(tx.wallet_id)
                .await?
                .ok_or(WalletError::WalletNotFound {
                    wallet_id: tx.wallet_id.to_string(),
                })?;

        set_meta(&mut tx, "approved_by", json!(operator));
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        self.store.debit_and_complete(&tx).await?;
        self.audit_outcome(
            &wallet,
            &tx,
            actions::TX_APPROVED,
            AuditDecision::Allowed,
            json!({ "operator": operator }),
        )
        .await?;
        Ok(tx)
    }

    /// Operator rejection of an awaiting transaction
    pub async fn reject_pending(
        &self,
        id: TransactionId,
        operator: &str,
        reason: &str,
    ) -> Result<Transaction> {
        let mut tx = self
            .store
            .transaction(id)
            .await?
            .ok_or(WalletError::TransactionNotFound {
                transaction_id: id.to_string(),
            })?;
        if tx.status != TransactionStatus::AwaitingApproval {
            return Err(WalletError::state_conflict(
                "transaction",
                format!("expected awaiting_approval, found {:?}", tx.status),
            ));
        }

        tx.status = TransactionStatus::Rejected;
        set_meta(&mut tx, "rejected_by", json!(operator));
        set_meta(&mut tx, "rejection_reason", json!(reason));
        self.store.update_transaction(&tx).await?;

        let wallet = self.store.wallet(tx.wallet_id).await?;
        self.store
            .append_audit(AuditDraft::new(
                wallet.map(|w| w.agent_id),
                actions::TX_REJECTED,
                "transaction",
                tx.id.to_string(),
                AuditDecision::Blocked,
                json!({ "operator": operator, "reason": reason }),
            ))
            .await?;
        Ok(tx)
    }

    /// Deposit: bypasses rules, credits the balance, writes a completed
    /// deposit transaction. Not idempotent by id; repeated calls add
    /// repeatedly.
    pub async fn deposit(
        &self,
        wallet_id: WalletId,
        amount: Money,
        description: Option<String>,
    ) -> Result<AdmissionOutcome> {
        if !amount.is_positive() {
            return Err(WalletError::invalid_input("amount", "must be > 0"));
        }

        let lock = self.locks.for_wallet(wallet_id);
        let _guard = lock.lock().await;

        let wallet = self
            .store
            .wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            })?;
        if wallet.status == WalletStatus::Closed {
            return Err(WalletError::state_conflict("wallet", "wallet is closed"));
        }

        let mut candidate = TransactionCandidate::new(amount).with_category(DEPOSIT_CATEGORY);
        candidate.description = description;
        let mut tx = Transaction::from_candidate(wallet_id, &candidate);
        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        self.store.credit_and_complete(&tx).await?;

        self.audit_outcome(
            &wallet,
            &tx,
            actions::DEPOSIT,
            AuditDecision::System,
            json!({ "amount": amount }),
        )
        .await?;
        Ok(AdmissionOutcome {
            transaction: tx,
            evaluation: None,
        })
    }

    /// Owner freeze; reversible with [`Self::unfreeze_wallet`]
    pub async fn freeze_wallet(&self, wallet_id: WalletId) -> Result<()> {
        let wallet = self
            .store
            .wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            })?;
        if wallet.status == WalletStatus::KillSwitched {
            return Err(WalletError::state_conflict(
                "wallet",
                "kill-switched wallets recover only via switch reset",
            ));
        }
        self.store
            .set_wallet_status(wallet_id, WalletStatus::Frozen)
            .await?;
        self.store
            .append_audit(AuditDraft::new(
                Some(wallet.agent_id),
                actions::WALLET_FROZEN,
                "wallet",
                wallet_id.to_string(),
                AuditDecision::System,
                json!({}),
            ))
            .await?;
        Ok(())
    }

    pub async fn unfreeze_wallet(&self, wallet_id: WalletId) -> Result<()> {
        let wallet = self
            .store
            .wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound {
                wallet_id: wallet_id.to_string(),
            })?;
        if wallet.status != WalletStatus::Frozen {
            return Err(WalletError::state_conflict("wallet", "wallet is not frozen"));
        }
        self.store
            .set_wallet_status(wallet_id, WalletStatus::Active)
            .await?;
        self.store
            .append_audit(AuditDraft::new(
                Some(wallet.agent_id),
                actions::WALLET_UNFROZEN,
                "wallet",
                wallet_id.to_string(),
                AuditDecision::System,
                json!({}),
            ))
            .await?;
        Ok(())
    }

    /// Persist a rejection and emit its audit entry
    async fn reject(
        &self,
        wallet: &Wallet,
        mut tx: Transaction,
        reason: String,
    ) -> Result<AdmissionOutcome> {
        tx.status = TransactionStatus::Rejected;
        set_meta(&mut tx, "rejection_reason", json!(reason));
        self.store.insert_transaction(&tx).await?;
        self.audit_outcome(
            wallet,
            &tx,
            actions::TX_REJECTED,
            AuditDecision::Blocked,
            json!({ "reason": reason }),
        )
        .await?;
        Ok(AdmissionOutcome {
            transaction: tx,
            evaluation: None,
        })
    }

    async fn audit_outcome(
        &self,
        wallet: &Wallet,
        tx: &Transaction,
        action: &str,
        decision: AuditDecision,
        reasoning: serde_json::Value,
    ) -> Result<()> {
        self.store
            .append_audit(AuditDraft::new(
                Some(wallet.agent_id),
                action,
                "transaction",
                tx.id.to_string(),
                decision,
                reasoning,
            ))
            .await?;
        Ok(())
    }
}

/// Merge a key into the transaction's metadata object
fn set_meta(tx: &mut Transaction, key: &str, value: serde_json::Value) {
    if !tx.metadata.is_object() {
        tx.metadata = json!({});
    }
    if let Some(map) = tx.metadata.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
