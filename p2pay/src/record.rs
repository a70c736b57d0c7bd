//! Per-account payment records.
//!
//! After a payment is confirmed, [`record_payment`] stores when it happened.
//! [`payment_status`] later tells whether that payment is recent enough to
//! still count. Storage is injected through [`RecordStore`]; last write wins.

use std::time::Duration;

use alloy_primitives::TxHash;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::timestamp::UnixTimestamp;

/// Prefix of every record key.
pub const KEY_PREFIX: &str = "p2pay:v1:";

/// Builds the storage key for an account.
#[must_use]
pub fn storage_key(account: &str) -> String {
    format!("{KEY_PREFIX}{account}")
}

/// The stored record of an account's last payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// When the payment was recorded.
    pub timestamp: UnixTimestamp,
    /// Paying or settling transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// Amount paid, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Chain the payment landed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Details of a confirmed payment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    /// Paying or settling transaction.
    pub tx_hash: Option<TxHash>,
    /// Amount paid.
    pub amount: Option<String>,
    /// Chain the payment landed on.
    pub chain_id: Option<u64>,
}

/// Whether an account's last payment is still within its validity window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    /// `true` while the last payment is younger than the window.
    pub valid: bool,
    /// When the last payment was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<UnixTimestamp>,
    /// When the window closed; only set once it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<UnixTimestamp>,
}

/// Key-value storage for payment records.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads a record. A missing or unreadable entry is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    async fn get(&self, key: &str) -> Result<Option<PaymentRecord>, Error>;

    /// Writes a record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backend fails.
    async fn set(&self, key: &str, record: PaymentRecord) -> Result<(), Error>;
}

/// Process-local [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, PaymentRecord>,
}

impl MemoryRecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<PaymentRecord>, Error> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, record: PaymentRecord) -> Result<(), Error> {
        self.records.insert(key.to_owned(), record);
        Ok(())
    }
}

/// Records a confirmed payment for `account`, stamped with the current time.
///
/// Call only after the payment is known to have succeeded.
///
/// # Errors
///
/// Propagates store failures.
pub async fn record_payment(
    store: &dyn RecordStore,
    account: &str,
    details: PaymentDetails,
) -> Result<(), Error> {
    let record = PaymentRecord {
        timestamp: UnixTimestamp::now(),
        tx_hash: details.tx_hash,
        amount: details.amount,
        chain_id: details.chain_id,
    };
    #[cfg(feature = "telemetry")]
    tracing::debug!(account, timestamp = %record.timestamp, "recording payment");
    store.set(&storage_key(account), record).await
}

/// Reports whether `account` paid within the last `max_age`.
///
/// # Errors
///
/// Propagates store failures.
pub async fn payment_status(
    store: &dyn RecordStore,
    account: &str,
    max_age: Duration,
) -> Result<PaymentStatus, Error> {
    let Some(record) = store.get(&storage_key(account)).await? else {
        return Ok(PaymentStatus::default());
    };
    Ok(status_at(&record, max_age, UnixTimestamp::now()))
}

fn status_at(record: &PaymentRecord, max_age: Duration, now: UnixTimestamp) -> PaymentStatus {
    let expires = record.timestamp + max_age;
    let valid = expires > now;
    PaymentStatus {
        valid,
        last_payment_at: Some(record.timestamp),
        expired_at: (!valid).then_some(expires),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    #[tokio::test]
    async fn test_unknown_account_is_invalid() {
        let store = MemoryRecordStore::new();
        let status = payment_status(&store, "alice", DAY).await.unwrap();
        assert_eq!(status, PaymentStatus::default());
    }

    #[tokio::test]
    async fn test_recent_payment_is_valid() {
        let store = MemoryRecordStore::new();
        let details = PaymentDetails {
            tx_hash: Some(TxHash::repeat_byte(0x0a)),
            amount: Some("5".to_owned()),
            chain_id: Some(8453),
        };
        record_payment(&store, "alice", details).await.unwrap();

        let stored = store.get("p2pay:v1:alice").await.unwrap().unwrap();
        assert_eq!(stored.chain_id, Some(8453));

        let status = payment_status(&store, "alice", DAY).await.unwrap();
        assert!(status.valid);
        assert!(status.expired_at.is_none());
    }

    #[test]
    fn test_expired_payment_reports_expiry() {
        let record = PaymentRecord {
            timestamp: UnixTimestamp::from_secs(1_000),
            tx_hash: None,
            amount: None,
            chain_id: None,
        };
        let status = status_at(&record, Duration::from_secs(100), UnixTimestamp::from_secs(1_100));
        assert!(!status.valid);
        assert_eq!(status.expired_at, Some(UnixTimestamp::from_secs(1_100)));

        let status = status_at(&record, Duration::from_secs(100), UnixTimestamp::from_secs(1_099));
        assert!(status.valid);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryRecordStore::new();
        for amount in ["1", "2"] {
            let details = PaymentDetails {
                amount: Some(amount.to_owned()),
                ..PaymentDetails::default()
            };
            record_payment(&store, "bob", details).await.unwrap();
        }
        let stored = store.get(&storage_key("bob")).await.unwrap().unwrap();
        assert_eq!(stored.amount.as_deref(), Some("2"));
    }
}
