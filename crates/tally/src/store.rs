// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::error::{Result, SourceError};
use crate::record::Record;
use crate::source::{PageToken, RecordSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a snapshot is served before the next read re-scans.
    #[serde(with = "secs")]
    pub ttl: Duration,
    /// Upper bound on a single page request.
    #[serde(with = "secs")]
    pub scan_timeout: Duration,
    /// Guard against sources whose continuation tokens never run out.
    pub max_pages: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            scan_timeout: Duration::from_secs(30),
            max_pages: 10_000,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Immutable view of every record at one point in time.
#[derive(Debug)]
pub struct RecordSnapshot {
    records: Vec<Record>,
    captured_at: Instant,
    captured_wall: DateTime<Utc>,
}

impl RecordSnapshot {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            captured_at: Instant::now(),
            captured_wall: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_wall
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// TTL cache over a [`RecordSource`]. Snapshots are replaced wholesale, so
/// readers holding an `Arc<RecordSnapshot>` never see a partial refresh.
pub struct RecordStore {
    source: Arc<dyn RecordSource>,
    config: StoreConfig,
    current: RwLock<Option<Arc<RecordSnapshot>>>,
    /// Single-writer lock: at most one scan in flight.
    refresh: Mutex<()>,
    /// Bumped on invalidate so a scan that started earlier is not cached.
    generation: AtomicU64,
}

impl RecordStore {
    pub fn new(source: Arc<dyn RecordSource>, config: StoreConfig) -> Self {
        Self {
            source,
            config,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the cached snapshot while it is younger than the TTL, otherwise
    /// re-scans the source. A failed scan is returned as an error; the stale
    /// snapshot stays available through [`RecordStore::cached`].
    pub async fn snapshot(&self, force_refresh: bool) -> Result<Arc<RecordSnapshot>> {
        if !force_refresh {
            if let Some(snapshot) = self.fresh().await {
                debug!(records = snapshot.len(), "Snapshot cache hit");
                return Ok(snapshot);
            }
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if !force_refresh {
            if let Some(snapshot) = self.fresh().await {
                debug!(records = snapshot.len(), "Snapshot refreshed by concurrent caller");
                return Ok(snapshot);
            }
        }

        debug!(force_refresh, "Snapshot cache miss");
        let generation = self.generation.load(Ordering::Acquire);
        let records = self.scan_all().await?;
        let snapshot = Arc::new(RecordSnapshot::new(records));

        let mut slot = self.current.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(Arc::clone(&snapshot));
        } else {
            debug!("Store invalidated during scan, snapshot not cached");
        }
        Ok(snapshot)
    }

    /// Drops the cached snapshot; the next read re-scans.
    pub async fn invalidate(&self) {
        let mut slot = self.current.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let previous = slot.take();
        debug!(had_snapshot = previous.is_some(), "Store invalidated");
    }

    /// Last snapshot regardless of age, for callers willing to serve stale data.
    pub async fn cached(&self) -> Option<Arc<RecordSnapshot>> {
        self.current.read().await.clone()
    }

    async fn fresh(&self) -> Option<Arc<RecordSnapshot>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|snapshot| snapshot.age() < self.config.ttl)
            .cloned()
    }

    async fn scan_all(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut token: Option<PageToken> = None;
        let mut pages = 0usize;

        loop {
            if pages >= self.config.max_pages {
                warn!(source = self.source.name(), pages, "Scan exceeded page limit");
                return Err(SourceError::PaginationLimit { pages });
            }
            let page = tokio::time::timeout(self.config.scan_timeout, self.source.scan(token.take()))
                .await
                .map_err(|_| SourceError::Timeout(self.config.scan_timeout))??;
            pages += 1;
            records.extend(page.records);
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        info!(
            source = self.source.name(),
            records = records.len(),
            pages,
            "Scanned record source"
        );
        Ok(records)
    }
}
