use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::address::{Channel, ParamAddress};
use crate::bus::Subscription;
use crate::catalog::{AssetCatalog, SymbolDescriptor};
use crate::event::{ParamUpdate, ParamValue};
use crate::menu::MenuNode;
use crate::{Error, Result};

/// Latest known state of one `(pool, index)` group across all its channels.
///
/// A family is a monotonic merge: writing one channel never clears a sibling
/// that was already populated. Only observed channels are present.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamFamily {
    pub pool: String,
    pub index: u32,
    channels: BTreeMap<Channel, ParamValue>,
}

impl ParamFamily {
    fn new(pool: &str, index: u32) -> Self {
        Self {
            pool: pool.to_string(),
            index,
            channels: BTreeMap::new(),
        }
    }

    pub fn channel(&self, channel: Channel) -> Option<&ParamValue> {
        self.channels.get(&channel)
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.channel(Channel::Value)
    }

    /// Raw status bitmask, when the status channel holds an integer.
    pub fn status_raw(&self) -> Option<u32> {
        self.channel(Channel::Status)?.as_u32()
    }

    pub fn unit_code(&self) -> Option<&ParamValue> {
        self.channel(Channel::Unit)
    }

    pub fn min(&self) -> Option<&ParamValue> {
        self.channel(Channel::Min)
    }

    pub fn max(&self) -> Option<&ParamValue> {
        self.channel(Channel::Max)
    }

    pub fn channels(&self) -> impl Iterator<Item = (Channel, &ParamValue)> {
        self.channels.iter().map(|(c, v)| (*c, v))
    }
}

#[derive(Default)]
struct StoreInner {
    families: HashMap<(String, u32), ParamFamily>,
    /// Flattened address-text -> value view for O(1) point lookups.
    flat: HashMap<String, ParamValue>,
    dropped: u64,
}

struct AttachedCatalog {
    catalog: Arc<AssetCatalog>,
    device_family: String,
}

/// Single source of truth for the last known value per parameter address.
///
/// Cloning is cheap and shares state. `upsert` is one non-suspending critical
/// section, so concurrent cooperative tasks (or real threads) can never tear
/// a family record. In asset-aware mode a catalog is attached and the resolve
/// methods delegate to it on a separate, read-mostly code path that never
/// holds the ingestion lock across an await.
#[derive(Clone, Default)]
pub struct ParamStore {
    inner: Arc<Mutex<StoreInner>>,
    catalog: Arc<Mutex<Option<Arc<AttachedCatalog>>>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one normalized update.
    ///
    /// Metadata-only updates (`value == None`) return the current family
    /// untouched. Bit-suffixed or otherwise underivable targets are dropped
    /// and counted, never raised: the vendor payload includes
    /// forward-compatible shapes we must survive.
    pub fn upsert(&self, update: &ParamUpdate) -> Option<ParamFamily> {
        let address = &update.address;
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let value = match &update.value {
            None => {
                return inner.families.get(&address.family_key()).cloned();
            }
            Some(v) => v.clone(),
        };

        if address.bit.is_some() {
            // Raw writes land on the whole status word, never a synthetic
            // per-bit identifier.
            inner.dropped += 1;
            warn!(address = %address, "dropping value write to bit-suffixed address");
            return None;
        }

        let key = address.family_key();
        let family = inner
            .families
            .entry(key)
            .or_insert_with(|| ParamFamily::new(&address.pool, address.index));
        family.channels.insert(address.channel, value.clone());
        let updated = family.clone();

        inner.flat.insert(address.to_string(), value);
        Some(updated)
    }

    /// Point lookup on the flattened view. A `_bit<n>` address on a status
    /// channel derives a boolean from the stored raw bitmask.
    pub fn get(&self, address_text: &str) -> Option<ParamValue> {
        let address = ParamAddress::parse(address_text).ok()?;
        let inner = self.inner.lock().expect("store lock poisoned");
        match address.bit {
            Some(bit) if address.channel == Channel::Status => {
                let raw = inner.flat.get(&address.base().to_string())?.as_u32()?;
                Some(ParamValue::Bool(raw >> bit & 1 == 1))
            }
            Some(_) => None,
            None => inner.flat.get(address_text).cloned(),
        }
    }

    pub fn get_family(&self, pool: &str, index: u32) -> Option<ParamFamily> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner.families.get(&(pool.to_string(), index)).cloned()
    }

    /// Snapshot of every observed address. Channels that were never observed
    /// do not appear; there is no `None` entry to confuse "unknown" with
    /// "explicitly null".
    pub fn flatten(&self) -> BTreeMap<String, ParamValue> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner.flat.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Number of updates dropped for unresolvable targets.
    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().expect("store lock poisoned").dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit full reset. Families are otherwise never deleted in-session.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.families.clear();
        inner.flat.clear();
    }

    /// Consume updates from a bus subscription forever.
    ///
    /// One malformed update must never kill the loop: processing failures are
    /// counted and logged inside `upsert`, per update, and the subscription
    /// keeps running. Cancellation (dropping the task) can only land between
    /// updates because `upsert` never suspends.
    pub async fn run_with_bus(&self, mut subscription: Subscription) {
        while let Some(update) = subscription.next().await {
            let applied = self.upsert(&update);
            if applied.is_none() && update.value.is_some() {
                debug!(sequence = update.sequence, "update not applied");
            }
        }
        debug!("bus closed, store consumer exiting");
    }

    // -- Asset-aware mode --

    /// Attach a catalog, switching this store into asset-aware mode for the
    /// given device family. A construction-time choice, not per-call.
    pub fn attach_catalog(&self, catalog: Arc<AssetCatalog>, device_family: impl Into<String>) {
        let mut slot = self.catalog.lock().expect("catalog slot poisoned");
        *slot = Some(Arc::new(AttachedCatalog {
            catalog,
            device_family: device_family.into(),
        }));
    }

    fn attached(&self) -> Result<Arc<AttachedCatalog>> {
        self.catalog
            .lock()
            .expect("catalog slot poisoned")
            .clone()
            .ok_or(Error::CatalogNotAttached)
    }

    /// Resolve the localized label for a symbolic parameter name.
    /// Fails with [`Error::Resolution`] so the caller can decide how to
    /// degrade (e.g. fall back to the raw address string).
    pub async fn resolve_label(&self, symbol: &str, lang: &str) -> Result<String> {
        let attached = self.attached()?;
        let model = attached
            .catalog
            .get_module_model(&attached.device_family, lang)
            .await?;
        model.require_label(symbol)
    }

    /// Permission-filtered menu tree for a device family. `None` when the
    /// granted set can see nothing.
    pub async fn get_menu(
        &self,
        device_family: &str,
        lang: &str,
        granted: &BTreeSet<String>,
    ) -> Result<Option<MenuNode>> {
        let attached = self.attached()?;
        let model = attached.catalog.get_module_model(device_family, lang).await?;
        model.menu_for(granted)
    }

    /// Join static catalog metadata for one symbol with the live values held
    /// here. The canonical enrichment join for entity-descriptor generation.
    pub async fn describe_symbol(&self, symbol: &str, lang: &str) -> Result<SymbolDescriptor> {
        let attached = self.attached()?;
        let model = attached
            .catalog
            .get_module_model(&attached.device_family, lang)
            .await?;
        model.describe_symbol(symbol, self)
    }
}
