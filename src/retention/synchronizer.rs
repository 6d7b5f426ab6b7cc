use super::{ItemFailure, LoadReport, LoadStats, PassReport, SaveReport};
use crate::codec::RetentionCodec;
use crate::error::{ItemFailureKind, RepcacheError, Result};
use crate::key::{display_key, RetentionKey};
use crate::pool::{ConnectionHandle, ConnectionSelector};
use crate::transport::{CacheConnection, Connector};
use crate::types::{RetentionData, ServiceId};
use chrono::Utc;

enum Fetched<T> {
    Loaded(T),
    Absent,
    Skipped,
}

/// Runs save and load passes. Each pass acquires its own connection, works
/// through every object one key at a time, and releases the connection before
/// returning.
pub struct RetentionSynchronizer<K, C> {
    selector: ConnectionSelector<K>,
    codec: C,
    continue_on_item_error: bool,
}

impl<K: Connector, C: RetentionCodec> RetentionSynchronizer<K, C> {
    pub fn new(selector: ConnectionSelector<K>, codec: C) -> Self {
        Self {
            selector,
            codec,
            continue_on_item_error: true,
        }
    }

    /// With `false`, the first item failure ends the pass with
    /// [`RepcacheError::ItemAborted`].
    pub fn with_continue_on_item_error(mut self, continue_on_item_error: bool) -> Self {
        self.continue_on_item_error = continue_on_item_error;
        self
    }

    pub fn selector(&self) -> &ConnectionSelector<K> {
        &self.selector
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn continue_on_item_error(&self) -> bool {
        self.continue_on_item_error
    }

    /// Store every host and service of `data`, one key per object.
    ///
    /// Fails only when no server is reachable (or an item fails while
    /// `continue_on_item_error` is off). Dropped items are listed in the report.
    pub fn save(&self, data: &RetentionData<C::Object>) -> Result<SaveReport> {
        let started_at = Utc::now();
        let mut handle = self.selector.acquire().inspect_err(|e| {
            tracing::error!("[RepcacheRetention] save pass aborted: {}", e);
        })?;

        let mut pass = PassReport::begin(handle.address(), started_at);
        let mut stored = 0;

        for (host_name, object) in &data.hosts {
            if self.save_item(&mut handle, RetentionKey::host(host_name), object, &mut pass)? {
                stored += 1;
            }
        }

        for (id, object) in &data.services {
            if self.save_item(&mut handle, RetentionKey::service(id), object, &mut pass)? {
                stored += 1;
            }
        }

        handle.release();
        pass.finish();

        tracing::info!(
            "[RepcacheRetention] saved {} of {} objects to {} ({} failed)",
            stored,
            pass.attempted,
            pass.server,
            pass.failed()
        );
        Ok(SaveReport { pass, stored })
    }

    /// Fetch retention state for the given identities only.
    ///
    /// Keys the server does not hold are counted as absent and left out of
    /// the result; they do not count as failures.
    pub fn load(
        &self,
        host_names: &[String],
        services: &[ServiceId],
    ) -> Result<LoadReport<C::Object>> {
        let started_at = Utc::now();
        let mut handle = self.selector.acquire().inspect_err(|e| {
            tracing::error!("[RepcacheRetention] load pass aborted: {}", e);
        })?;

        let mut pass = PassReport::begin(handle.address(), started_at);
        let mut data = RetentionData::new();
        let mut absent = 0;

        for host_name in host_names {
            match self.load_item(&mut handle, RetentionKey::host(host_name), &mut pass)? {
                Fetched::Loaded(object) => {
                    data.hosts.insert(host_name.clone(), object);
                }
                Fetched::Absent => absent += 1,
                Fetched::Skipped => {}
            }
        }

        for id in services {
            match self.load_item(&mut handle, RetentionKey::service(id), &mut pass)? {
                Fetched::Loaded(object) => {
                    data.services.insert(id.clone(), object);
                }
                Fetched::Absent => absent += 1,
                Fetched::Skipped => {}
            }
        }

        handle.release();
        pass.finish();

        let loaded = data.len();
        tracing::info!(
            "[RepcacheRetention] loaded {} of {} objects from {} ({} absent, {} failed)",
            loaded,
            pass.attempted,
            pass.server,
            absent,
            pass.failed()
        );
        Ok(LoadReport {
            stats: LoadStats {
                pass,
                loaded,
                absent,
            },
            data,
        })
    }

    fn save_item<Conn: CacheConnection>(
        &self,
        handle: &mut ConnectionHandle<Conn>,
        key: RetentionKey<'_>,
        object: &C::Object,
        pass: &mut PassReport,
    ) -> Result<bool> {
        pass.attempted += 1;
        let key_bytes = key.to_bytes();

        let outcome = self
            .codec
            .encode(object)
            .map_err(|e| (ItemFailureKind::Encode, e))
            .and_then(|value| {
                handle
                    .store(&key_bytes, &value)
                    .map_err(|e| (ItemFailureKind::Store, e))
            });

        match outcome {
            Ok(()) => Ok(true),
            Err((kind, err)) => self.item_failed(pass, &key_bytes, kind, err).map(|_| false),
        }
    }

    fn load_item<Conn: CacheConnection>(
        &self,
        handle: &mut ConnectionHandle<Conn>,
        key: RetentionKey<'_>,
        pass: &mut PassReport,
    ) -> Result<Fetched<C::Object>> {
        pass.attempted += 1;
        let key_bytes = key.to_bytes();

        let raw = match handle.fetch(&key_bytes) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(Fetched::Absent),
            Err(err) => {
                self.item_failed(pass, &key_bytes, ItemFailureKind::Fetch, err)?;
                return Ok(Fetched::Skipped);
            }
        };

        match self.codec.decode(&raw) {
            Ok(object) => Ok(Fetched::Loaded(object)),
            Err(err) => {
                self.item_failed(pass, &key_bytes, ItemFailureKind::Decode, err)?;
                Ok(Fetched::Skipped)
            }
        }
    }

    fn item_failed(
        &self,
        pass: &mut PassReport,
        key: &[u8],
        kind: ItemFailureKind,
        err: RepcacheError,
    ) -> Result<()> {
        let key = display_key(key);
        let reason = err.to_string();
        tracing::error!(
            "[RepcacheRetention] {} failed for {}: {}",
            kind,
            key,
            reason
        );
        pass.failures.push(ItemFailure {
            key: key.clone(),
            kind,
            reason: reason.clone(),
        });

        if self.continue_on_item_error {
            Ok(())
        } else {
            Err(RepcacheError::ItemAborted { key, kind, reason })
        }
    }
}
