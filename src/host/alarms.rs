//! Durable wall-clock alarms

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, warn};

use super::{AlarmHost, AlarmSpec, HostError, StorageBackend};

/// Storage key of the persisted alarm table
pub const ALARMS_KEY: &str = "alarms";

/// Alarm table keyed by name, fired against the wall clock.
///
/// Deadlines are absolute `DateTime<Utc>` values, so time spent with the
/// process or the whole machine suspended counts toward them. When a storage
/// backend is attached the table is written on every change and reloaded by
/// [`LocalAlarms::restore`].
pub struct LocalAlarms {
    alarms: Mutex<BTreeMap<String, AlarmSpec>>,
    storage: Option<Arc<dyn StorageBackend>>,
    /// Held from snapshot to completed write, so writes land in table order
    persisting: AsyncMutex<()>,
}

impl LocalAlarms {
    /// Alarm table that lives only in memory
    pub fn new() -> Self {
        Self {
            alarms: Mutex::new(BTreeMap::new()),
            storage: None,
            persisting: AsyncMutex::new(()),
        }
    }

    /// Reload the persisted alarm table from `storage`
    pub async fn restore(storage: Arc<dyn StorageBackend>) -> Self {
        let alarms = match storage.get(ALARMS_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Discarding unreadable alarm table: {}", e);
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                error!("Failed to load alarms: {}", e);
                BTreeMap::new()
            }
        };
        debug!("Restored {} alarms", alarms.len());

        Self {
            alarms: Mutex::new(alarms),
            storage: Some(storage),
            persisting: AsyncMutex::new(()),
        }
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, AlarmSpec>> {
        self.alarms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn persist(&self) -> Result<(), HostError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let _persisting = self.persisting.lock().await;
        let value = serde_json::to_value(&*self.table())
            .map_err(|e| HostError::Storage(format!("Failed to encode alarms: {}", e)))?;
        storage.set(ALARMS_KEY, value).await
    }

    /// Names of the alarms due at `now`.
    ///
    /// One-shot alarms are removed; periodic alarms move to the first period
    /// boundary after `now`, so ticks missed while suspended fire once.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let due = {
            let mut table = self.table();
            let due: Vec<String> = table
                .iter()
                .filter(|(_, spec)| spec.when <= now)
                .map(|(name, _)| name.clone())
                .collect();

            for name in &due {
                let next = table
                    .get(name)
                    .and_then(|spec| next_occurrence(spec, now));
                match next {
                    Some(when) => {
                        if let Some(spec) = table.get_mut(name) {
                            spec.when = when;
                        }
                    }
                    None => {
                        table.remove(name);
                    }
                }
            }
            due
        };

        if !due.is_empty() {
            if let Err(e) = self.persist().await {
                warn!("Failed to persist alarms after firing: {}", e);
            }
        }
        due
    }

    /// Number of pending alarms
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

impl Default for LocalAlarms {
    fn default() -> Self {
        Self::new()
    }
}

fn next_occurrence(spec: &AlarmSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let period_ms = i64::try_from(spec.period_ms?).ok().filter(|&ms| ms > 0)?;
    let elapsed_ms = (now - spec.when).num_milliseconds().max(0);
    let periods = elapsed_ms / period_ms + 1;
    Some(spec.when + Duration::milliseconds(periods * period_ms))
}

#[async_trait]
impl AlarmHost for LocalAlarms {
    async fn create(&self, name: &str, spec: AlarmSpec) -> Result<(), HostError> {
        self.table().insert(name.to_string(), spec);
        debug!("Alarm {} set for {}", name, spec.when);
        self.persist().await
    }

    async fn clear(&self, name: &str) -> Result<bool, HostError> {
        let removed = self.table().remove(name).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<(), HostError> {
        self.table().clear();
        self.persist().await
    }

    async fn get(&self, name: &str) -> Result<Option<AlarmSpec>, HostError> {
        Ok(self.table().get(name).copied())
    }
}
