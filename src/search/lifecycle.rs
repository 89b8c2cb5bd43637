//! Index lifecycle - decides when an owner's index is loaded, reused or rebuilt
//!
//! Each owner gets its own slot with an independent writer lock. Readers
//! take an `Arc` snapshot of the resident index, so a rebuild in progress
//! is never observed half-done: readers see the previous complete index or
//! the new one. Slots of different owners share nothing but the cache map,
//! which is only held for lookups.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::embedding::ModelHandle;
use super::store::IndexStore;
use super::user_index::UserIndex;
use crate::core::document::{DocumentStore, OwnerId};
use crate::error::{IndexError, Result};

/// Where an owner's index currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    Absent,
    Loading,
    Resident,
    Rebuilding,
}

/// What to do with an index built before the owner's documents last changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Rebuild on the next query
    #[default]
    Rebuild,
    /// Keep serving the old index until an explicit rebuild
    Ignore,
}

#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum number of owners kept resident
    pub cache_capacity: usize,
    pub staleness: StalenessPolicy,
    /// Upper bound on waiting for another caller's rebuild of the same owner
    pub rebuild_timeout: Option<Duration>,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            staleness: StalenessPolicy::default(),
            rebuild_timeout: None,
        }
    }
}

/// Snapshot of an owner's index state for operators
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub owner_id: OwnerId,
    pub phase: IndexPhase,
    pub documents: Option<usize>,
    pub model: String,
    pub created_at: Option<String>,
    pub index_generation: Option<u64>,
    pub document_generation: u64,
    pub persisted: bool,
}

struct OwnerSlot {
    resident: RwLock<Option<Arc<UserIndex>>>,
    phase: Mutex<IndexPhase>,
    writer: Mutex<()>,
    last_used: AtomicU64,
}

impl OwnerSlot {
    fn new() -> Self {
        Self {
            resident: RwLock::new(None),
            phase: Mutex::new(IndexPhase::Absent),
            writer: Mutex::new(()),
            last_used: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Option<Arc<UserIndex>> {
        self.resident.read().clone()
    }

    fn install(&self, index: Arc<UserIndex>) {
        *self.resident.write() = Some(index);
        *self.phase.lock() = IndexPhase::Resident;
    }

    fn clear(&self) {
        *self.resident.write() = None;
        *self.phase.lock() = IndexPhase::Absent;
    }

    fn set_phase(&self, phase: IndexPhase) {
        *self.phase.lock() = phase;
    }

    /// Phase after a failed load or rebuild
    fn settle(&self) {
        let phase = if self.resident.read().is_some() {
            IndexPhase::Resident
        } else {
            IndexPhase::Absent
        };
        self.set_phase(phase);
    }
}

pub struct IndexLifecycleManager {
    store: IndexStore,
    documents: Arc<dyn DocumentStore>,
    model: Arc<ModelHandle>,
    options: LifecycleOptions,
    slots: Mutex<HashMap<OwnerId, Arc<OwnerSlot>>>,
    generations: Mutex<HashMap<OwnerId, u64>>,
    clock: AtomicU64,
}

impl IndexLifecycleManager {
    pub fn new(
        store: IndexStore,
        documents: Arc<dyn DocumentStore>,
        model: Arc<ModelHandle>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            store,
            documents,
            model,
            options,
            slots: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Index currently in memory for `owner`, without loading anything
    pub fn resident(&self, owner: OwnerId) -> Option<Arc<UserIndex>> {
        let slot = self.slots.lock().get(&owner).cloned()?;
        self.touch(&slot);
        slot.current()
    }

    pub fn phase(&self, owner: OwnerId) -> IndexPhase {
        self.slots
            .lock()
            .get(&owner)
            .map(|slot| *slot.phase.lock())
            .unwrap_or(IndexPhase::Absent)
    }

    /// Owners with a slot in the cache
    pub fn cached_owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<_> = self.slots.lock().keys().copied().collect();
        owners.sort_unstable();
        owners
    }

    /// Record that an owner's documents changed. Indices built before this
    /// call are stale under [`StalenessPolicy::Rebuild`].
    ///
    /// The first change seen for an owner counts from the generation of its
    /// persisted index, which may have been written by an earlier process.
    pub fn note_document_change(&self, owner: OwnerId) -> u64 {
        let persisted = if self.generations.lock().contains_key(&owner) {
            None
        } else {
            self.store.persisted_generation(owner)
        };

        let mut generations = self.generations.lock();
        let generation = generations.entry(owner).or_insert(0);
        *generation = (*generation).max(persisted.unwrap_or(0)) + 1;
        *generation
    }

    pub fn document_generation(&self, owner: OwnerId) -> u64 {
        self.generations.lock().get(&owner).copied().unwrap_or(0)
    }

    /// Make sure a current index for `owner` is in memory: reuse the resident
    /// one, else load it from disk, else rebuild from the owner's documents.
    pub fn ensure_resident(&self, owner: OwnerId) -> Result<Arc<UserIndex>> {
        let slot = self.slot(owner);
        if let Some(index) = slot.current().filter(|i| self.is_fresh(i)) {
            return Ok(index);
        }

        let _writer = self.lock_writer(owner, &slot)?;
        // Another caller may have finished while we waited.
        if let Some(index) = slot.current().filter(|i| self.is_fresh(i)) {
            return Ok(index);
        }

        if slot.current().is_none() {
            slot.set_phase(IndexPhase::Loading);
            if let Some(index) = self.store.load(owner, self.model.name()).into_index() {
                self.adopt_generation(owner, index.generation());
                if self.is_fresh(&index) {
                    info!(owner, documents = index.len(), "index loaded");
                    let index = Arc::new(index);
                    slot.install(Arc::clone(&index));
                    return Ok(index);
                }
                debug!(owner, "persisted index is stale");
            }
        } else {
            debug!(owner, "resident index is stale");
        }

        self.rebuild_locked(owner, &slot)
    }

    /// Discard whatever exists for `owner` and rebuild from scratch
    pub fn rebuild(&self, owner: OwnerId) -> Result<Arc<UserIndex>> {
        let slot = self.slot(owner);
        let _writer = self.lock_writer(owner, &slot)?;

        if let Err(e) = self.store.remove(owner) {
            warn!(owner, error = %e, "could not remove persisted index before rebuild");
        }
        self.rebuild_locked(owner, &slot).map_err(|e| {
            slot.clear();
            e
        })
    }

    /// Drop the resident and persisted index of `owner`
    pub fn invalidate(&self, owner: OwnerId) -> Result<()> {
        let slot = self.slot(owner);
        let _writer = self.lock_writer(owner, &slot)?;
        slot.clear();
        self.store.remove(owner)
    }

    /// Remove `owner` from the in-memory cache. Returns false if the slot is
    /// in use by another caller.
    pub fn evict(&self, owner: OwnerId) -> bool {
        let mut slots = self.slots.lock();
        let idle = match slots.get(&owner) {
            Some(slot) => Arc::strong_count(slot) == 1,
            None => return true,
        };
        if idle {
            slots.remove(&owner);
        }
        idle
    }

    pub fn status(&self, owner: OwnerId) -> IndexStatus {
        let index = self.resident(owner);
        IndexStatus {
            owner_id: owner,
            phase: self.phase(owner),
            documents: index.as_ref().map(|i| i.len()),
            model: self.model.name().to_string(),
            created_at: index.as_ref().map(|i| i.created_at().to_rfc3339()),
            index_generation: index.as_ref().map(|i| i.generation()),
            document_generation: self.document_generation(owner),
            persisted: self.store.exists(owner),
        }
    }

    fn is_fresh(&self, index: &UserIndex) -> bool {
        match self.options.staleness {
            StalenessPolicy::Ignore => true,
            StalenessPolicy::Rebuild => index.generation() >= self.document_generation(index.owner_id()),
        }
    }

    /// Keep the counter at or past a loaded index's generation so the next
    /// change always makes it stale.
    fn adopt_generation(&self, owner: OwnerId, loaded: u64) {
        let mut generations = self.generations.lock();
        let generation = generations.entry(owner).or_insert(0);
        *generation = (*generation).max(loaded);
    }

    fn touch(&self, slot: &OwnerSlot) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        slot.last_used.store(tick, Ordering::Relaxed);
    }

    /// Slot for `owner`, creating it and evicting the least recently used
    /// idle owners beyond capacity.
    fn slot(&self, owner: OwnerId) -> Arc<OwnerSlot> {
        let mut slots = self.slots.lock();
        let slot = Arc::clone(
            slots
                .entry(owner)
                .or_insert_with(|| Arc::new(OwnerSlot::new())),
        );
        self.touch(&slot);

        let capacity = self.options.cache_capacity.max(1);
        while slots.len() > capacity {
            // Slots referenced outside the map are busy; never evict those so
            // an owner can't end up with two live slots.
            let victim = slots
                .iter()
                .filter(|(id, s)| **id != owner && Arc::strong_count(s) == 1)
                .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| *id);
            match victim {
                Some(id) => {
                    debug!(owner = id, "evicting index from cache");
                    slots.remove(&id);
                }
                None => break,
            }
        }
        slot
    }

    fn lock_writer<'a>(&self, owner: OwnerId, slot: &'a OwnerSlot) -> Result<MutexGuard<'a, ()>> {
        match self.options.rebuild_timeout {
            None => Ok(slot.writer.lock()),
            Some(timeout) => {
                let start = Instant::now();
                slot.writer
                    .try_lock_for(timeout)
                    .ok_or_else(|| IndexError::RebuildTimedOut {
                        owner,
                        waited_ms: start.elapsed().as_millis(),
                    })
            }
        }
    }

    /// Build a new index from the owner's documents, persist it and swap it
    /// in. Caller holds the slot's writer lock.
    fn rebuild_locked(&self, owner: OwnerId, slot: &OwnerSlot) -> Result<Arc<UserIndex>> {
        slot.set_phase(IndexPhase::Rebuilding);
        let start = Instant::now();

        let index = match self.build_index(owner) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                warn!(owner, error = %e, "index rebuild failed");
                slot.settle();
                return Err(e);
            }
        };

        if let Err(e) = self.store.save(&index) {
            warn!(owner, error = %e, "index built but could not be persisted");
        }
        slot.install(Arc::clone(&index));

        info!(
            owner,
            documents = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(index)
    }

    fn build_index(&self, owner: OwnerId) -> Result<UserIndex> {
        // Read the generation first so a change during the build leaves
        // this index stale rather than looking current.
        let generation = self.document_generation(owner);
        let docs = self.documents.indexable_documents(owner)?;

        if docs.is_empty() {
            debug!(owner, "no documents with content");
            return UserIndex::build(owner, self.model.name(), 0, generation, Vec::new());
        }

        let texts: Vec<String> = docs.iter().map(|d| d.index_text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.model.encode(&text_refs)?;
        let dimension = self.model.model()?.dimension();

        UserIndex::build(
            owner,
            self.model.name(),
            dimension,
            generation,
            docs.iter().map(|d| d.id).zip(vectors),
        )
    }
}
