//! Call ledger: call lifecycle records, cost and wallet debit.
//!
//! The ledger is the only writer of terminal call status. A call is opened
//! once when its media stream is accepted and closed once, by whichever of
//! the session teardown or the carrier status webhook gets there first.

mod store;
pub mod supabase;
mod types;
mod wallet;

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::config::pricing::CallRates;

pub use store::{CallStore, InMemoryCallStore};
pub use supabase::{SupabaseCallStore, SupabaseClient, SupabaseWallet};
pub use types::{
    CallFinalization, CallOutcome, CallRecord, DebitOutcome, LedgerEntry, LedgerError,
    LedgerResult, NewCall,
};
pub use wallet::{InMemoryWallet, Wallet, WalletDebit};

/// Process-wide call ledger shared by sessions and webhooks.
#[derive(Clone)]
pub struct CallLedger {
    store: Arc<dyn CallStore>,
    wallet: Arc<dyn Wallet>,
    rates: CallRates,
}

impl std::fmt::Debug for CallLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLedger")
            .field("rates", &self.rates)
            .finish_non_exhaustive()
    }
}

impl CallLedger {
    pub fn new(store: Arc<dyn CallStore>, wallet: Arc<dyn Wallet>, rates: CallRates) -> Self {
        Self {
            store,
            wallet,
            rates,
        }
    }

    /// Ledger over the in-memory store and wallet.
    pub fn in_memory(rates: CallRates) -> Self {
        Self::new(
            Arc::new(InMemoryCallStore::new()),
            Arc::new(InMemoryWallet::new()),
            rates,
        )
    }

    pub fn rates(&self) -> &CallRates {
        &self.rates
    }

    /// Insert the call as `in-progress`, stamped with the current time.
    pub async fn open_entry(&self, call: NewCall) -> LedgerResult<CallRecord> {
        let call_sid = call.call_sid.clone();
        let record = self
            .store
            .insert(CallRecord::open(call, OffsetDateTime::now_utc()))
            .await?;

        info!(
            call_sid = %call_sid,
            direction = record.direction.as_str(),
            "Opened ledger entry"
        );
        Ok(record)
    }

    /// Finalize the call and bill it.
    ///
    /// When `duration_seconds` is `None` the duration is the wall time since
    /// the entry was opened; a given duration instead fixes the end time at
    /// `started_at + duration`. Cost and duration are persisted in the same
    /// store write. The wallet debit that follows is attempted once; its
    /// failure is reported in [`LedgerEntry::debit`] and never rolls back the
    /// recorded cost.
    pub async fn close_entry(
        &self,
        call_sid: &str,
        duration_seconds: Option<u64>,
        outcome: CallOutcome,
    ) -> LedgerResult<LedgerEntry> {
        let record = self
            .store
            .get(call_sid)
            .await?
            .ok_or_else(|| LedgerError::NotFound(call_sid.to_string()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinalized(call_sid.to_string()));
        }

        let (ended_at, duration_seconds) = settle_duration(
            record.started_at,
            OffsetDateTime::now_utc(),
            duration_seconds,
        );
        let cost = self.rates.cost_for(duration_seconds);

        let finalized = self
            .store
            .finalize(
                call_sid,
                CallFinalization {
                    status: outcome.status(),
                    ended_at,
                    duration_seconds,
                    cost_usd: cost.total,
                },
            )
            .await?;

        info!(
            call_sid = %call_sid,
            status = finalized.status.as_str(),
            duration_seconds,
            cost_usd = cost.total,
            "Closed ledger entry"
        );

        let debit = self.debit(&finalized, cost.total, duration_seconds).await;

        Ok(LedgerEntry {
            call_sid: finalized.call_sid,
            status: finalized.status,
            started_at: finalized.started_at,
            ended_at,
            cost,
            debit,
        })
    }

    async fn debit(&self, record: &CallRecord, amount: f64, duration_seconds: u64) -> DebitOutcome {
        if amount <= 0.0 {
            return DebitOutcome::Skipped("zero cost");
        }
        let Some(user_id) = record.user_id.clone() else {
            return DebitOutcome::Skipped("no owning user");
        };

        let request = WalletDebit {
            user_id,
            amount,
            description: format!("Call {} ({}s)", record.call_sid, duration_seconds),
            call_id: record.id.clone(),
        };

        match self.wallet.debit(request).await {
            Ok(()) => {
                info!(call_sid = %record.call_sid, amount, "Debited wallet");
                DebitOutcome::Debited
            }
            Err(e) => {
                error!(call_sid = %record.call_sid, amount, "Wallet debit failed: {}", e);
                DebitOutcome::Failed(e.to_string())
            }
        }
    }

    /// Append transcript text. Failures are logged and swallowed.
    pub async fn append_transcript(&self, call_sid: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.store.append_transcript(call_sid, text).await {
            warn!(call_sid = %call_sid, "Failed to append transcript: {}", e);
        }
    }

    pub async fn call_record(&self, call_sid: &str) -> LedgerResult<Option<CallRecord>> {
        self.store.get(call_sid).await
    }
}

/// End time and duration for a call started at `started_at`.
///
/// The pair always satisfies `ended_at - started_at == duration`.
fn settle_duration(
    started_at: OffsetDateTime,
    now: OffsetDateTime,
    reported_seconds: Option<u64>,
) -> (OffsetDateTime, u64) {
    let reported_end = reported_seconds.and_then(|seconds| {
        let seconds = i64::try_from(seconds).ok()?;
        started_at.checked_add(time::Duration::seconds(seconds))
    });

    match (reported_seconds, reported_end) {
        (Some(seconds), Some(ended_at)) => (ended_at, seconds),
        _ => {
            let ended_at = now.max(started_at);
            let elapsed = (ended_at - started_at).whole_seconds().max(0) as u64;
            (started_at + time::Duration::seconds(elapsed as i64), elapsed)
        }
    }
}
