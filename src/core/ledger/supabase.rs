//! Supabase (PostgREST) backed call store and wallet.
//!
//! - `calls` table: one row per call, keyed by `twilio_call_sid`
//! - `rpc/deduct_from_wallet`: balance debit, arguments prefixed with `p_`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use http::HeaderValue;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::store::CallStore;
use super::types::{CallFinalization, CallRecord, LedgerError, LedgerResult};
use super::wallet::{Wallet, WalletDebit};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CALLS_TABLE: &str = "calls";

/// Thin PostgREST client shared by the store and the wallet.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    rest_url: String,
    service_key: String,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("rest_url", &self.rest_url)
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Drop for SupabaseClient {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.service_key.zeroize();
    }
}

impl SupabaseClient {
    pub fn new(url: &str, service_key: impl Into<String>) -> LedgerResult<Self> {
        let service_key = service_key.into();
        if service_key.trim().is_empty() {
            return Err(LedgerError::StoreError(
                "Supabase service key is required".to_string(),
            ));
        }
        HeaderValue::from_str(&service_key)
            .map_err(|_| LedgerError::StoreError("Supabase service key is not a valid header".into()))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::StoreError(e.to_string()))?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            service_key,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rpc/{}", self.rest_url, function)
    }

    /// Send and decode a `return=representation` row list.
    async fn rows(&self, request: RequestBuilder) -> Result<Vec<CallRecord>, (StatusCode, String)> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err((status, format!("HTTP {status}: {body}")));
        }

        response
            .json::<Vec<CallRecord>>()
            .await
            .map_err(|e| (status, format!("unexpected response body: {e}")))
    }
}

// =============================================================================
// Call store
// =============================================================================

#[derive(Serialize)]
struct TranscriptPatch<'a> {
    transcript: &'a str,
}

/// `calls` table store.
///
/// PostgREST has no append operator, so transcripts are accumulated here per
/// live call and written back whole on every append. A buffer is seeded from
/// the stored row on first use and evicted once the call is finalized, so a
/// late append still extends the stored text.
#[derive(Debug)]
pub struct SupabaseCallStore {
    client: Arc<SupabaseClient>,
    transcripts: DashMap<String, String>,
}

impl SupabaseCallStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self {
            client,
            transcripts: DashMap::new(),
        }
    }

    fn call_filter(call_sid: &str) -> (&'static str, String) {
        ("twilio_call_sid", format!("eq.{call_sid}"))
    }
}

#[async_trait]
impl CallStore for SupabaseCallStore {
    async fn insert(&self, record: CallRecord) -> LedgerResult<CallRecord> {
        let call_sid = record.call_sid.clone();
        let request = self
            .client
            .http
            .post(self.client.table_url(CALLS_TABLE))
            .header("Prefer", "return=representation")
            .json(&record);

        match self.client.rows(request).await {
            Ok(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Ok(_) => Ok(record),
            Err((StatusCode::CONFLICT, _)) => Err(LedgerError::AlreadyExists(call_sid)),
            Err((_, message)) => Err(LedgerError::StoreError(message)),
        }
    }

    async fn get(&self, call_sid: &str) -> LedgerResult<Option<CallRecord>> {
        let request = self
            .client
            .http
            .get(self.client.table_url(CALLS_TABLE))
            .query(&[Self::call_filter(call_sid), ("select", "*".to_string())]);

        let mut rows = self
            .client
            .rows(request)
            .await
            .map_err(|(_, message)| LedgerError::StoreError(message))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn finalize(
        &self,
        call_sid: &str,
        finalization: CallFinalization,
    ) -> LedgerResult<CallRecord> {
        // The status filter makes the update conditional, so only the first
        // finalization matches a row.
        let request = self
            .client
            .http
            .patch(self.client.table_url(CALLS_TABLE))
            .query(&[
                Self::call_filter(call_sid),
                ("status", "eq.in-progress".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&finalization);

        let mut rows = self
            .client
            .rows(request)
            .await
            .map_err(|(_, message)| LedgerError::StoreError(message))?;

        if rows.is_empty() {
            self.transcripts.remove(call_sid);
            return match self.get(call_sid).await? {
                Some(_) => Err(LedgerError::AlreadyFinalized(call_sid.to_string())),
                None => Err(LedgerError::NotFound(call_sid.to_string())),
            };
        }

        self.transcripts.remove(call_sid);
        Ok(rows.swap_remove(0))
    }

    async fn append_transcript(&self, call_sid: &str, text: &str) -> LedgerResult<()> {
        let transcript = match self.transcripts.get_mut(call_sid) {
            Some(mut buffer) => {
                buffer.push_str(text);
                buffer.clone()
            }
            None => {
                let record = self
                    .get(call_sid)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound(call_sid.to_string()))?;
                let mut transcript = record.transcript.unwrap_or_default();
                transcript.push_str(text);
                if !record.status.is_terminal() {
                    self.transcripts
                        .insert(call_sid.to_string(), transcript.clone());
                }
                transcript
            }
        };

        let request = self
            .client
            .http
            .patch(self.client.table_url(CALLS_TABLE))
            .query(&[Self::call_filter(call_sid)])
            .header("Prefer", "return=minimal")
            .json(&TranscriptPatch {
                transcript: &transcript,
            });

        let response = self
            .client
            .authorized(request)
            .send()
            .await
            .map_err(|e| LedgerError::StoreError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::StoreError(format!(
                "transcript update returned HTTP {}",
                response.status()
            )));
        }
        debug!(call_sid = %call_sid, "Updated transcript");
        Ok(())
    }
}

// =============================================================================
// Wallet
// =============================================================================

/// Wallet backed by the `deduct_from_wallet` database function.
#[derive(Debug, Clone)]
pub struct SupabaseWallet {
    client: Arc<SupabaseClient>,
}

impl SupabaseWallet {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Wallet for SupabaseWallet {
    async fn debit(&self, debit: WalletDebit) -> LedgerResult<()> {
        let request = self
            .client
            .http
            .post(self.client.rpc_url("deduct_from_wallet"))
            .json(&debit);

        let response = self
            .client
            .authorized(request)
            .send()
            .await
            .map_err(|e| LedgerError::WalletError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::WalletError(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}
