//! Sequence identifier minting
//!
//! Counters are persisted as decimal strings in the scalar property store.
//! Each counter has its own lock (`seq:<KEY>`), distinct from the store-wide
//! mutation lock, so minting an order id never waits on a deposit id.
//! A failed write after the increment leaves a gap; ids are never reused.

use crate::grid::{LockService, PropertyStore, ScopedLock};
use crate::types::LedgerError;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;

/// A named persisted counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    Estimate,
    Order,
    /// Daily deposit counter; the key embeds the date so it restarts each day
    Deposit(NaiveDate),
    /// Daily payment counter
    Payment(NaiveDate),
}

impl CounterKey {
    /// Property key the counter is persisted under
    pub fn property_key(&self) -> String {
        match self {
            CounterKey::Estimate => "SEQ_ESTIMATE".to_string(),
            CounterKey::Order => "SEQ_ORDER".to_string(),
            CounterKey::Deposit(day) => format!("SEQ_DEPOSIT_{}", day.format("%Y%m%d")),
            CounterKey::Payment(day) => format!("SEQ_PAYMENT_{}", day.format("%Y%m%d")),
        }
    }

    /// Render counter value `n` as an identifier
    pub fn format(&self, n: u64) -> String {
        match self {
            CounterKey::Estimate | CounterKey::Order => format!("{:07}-00", n),
            CounterKey::Deposit(day) => format!("DEP-{}-{:05}", day.format("%Y%m%d"), n),
            CounterKey::Payment(day) => format!("PAY-{}-{:05}", day.format("%Y%m%d"), n),
        }
    }
}

/// Timestamp-derived invoice identifier, `INV-MMddHHmmss`
pub fn invoice_id(at: NaiveDateTime) -> String {
    format!("INV-{}", at.format("%m%d%H%M%S"))
}

/// Mints identifiers from persisted counters under per-counter locks
#[derive(Clone)]
pub struct SequenceGenerator {
    properties: Arc<dyn PropertyStore>,
    locks: Arc<dyn LockService>,
    timeout: Duration,
}

impl SequenceGenerator {
    pub fn new(
        properties: Arc<dyn PropertyStore>,
        locks: Arc<dyn LockService>,
        timeout: Duration,
    ) -> Self {
        Self {
            properties,
            locks,
            timeout,
        }
    }

    /// Mint the next identifier for `key`
    ///
    /// # Returns
    ///
    /// * `Ok(id)` with a zero-padded identifier unique for the counter
    /// * `Err(LedgerError::LockTimeout)` if the counter lock stayed busy
    ///   past the bounded wait
    pub fn next(&self, key: CounterKey) -> Result<String, LedgerError> {
        let property = key.property_key();
        let _guard = ScopedLock::acquire(
            self.locks.as_ref(),
            &format!("seq:{}", property),
            self.timeout,
        )?;

        let last = match self.properties.get_property(&property)? {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                log::warn!("counter {} holds '{}', restarting from 0", property, raw);
                0
            }),
            None => 0,
        };
        let next = last + 1;
        self.properties.set_property(&property, &next.to_string())?;
        Ok(key.format(next))
    }
}
