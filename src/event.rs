use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{trace, warn};

use crate::address::{Channel, ParamAddress};

/// A typed scalar reading as carried by the portal.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl ParamValue {
    /// Convert a raw JSON scalar. Objects, arrays and null yield `None`.
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::String(s) => Some(ParamValue::Text(s.clone())),
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Text(_) => None,
        }
    }

    /// Integer view used for status bitmasks and unit codes.
    pub fn as_u32(&self) -> Option<u32> {
        let n = self.as_f64()?;
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
            Some(n as u32)
        } else {
            None
        }
    }
}

/// One normalized observation, produced from a REST prime snapshot or a
/// realtime delta and multicast through the [`EventBus`](crate::EventBus).
///
/// `value == None` marks a metadata-only frame: lightweight consumers must
/// not let it overwrite a previously observed value.
#[derive(Debug, Clone)]
pub struct ParamUpdate {
    pub device_id: String,
    pub address: ParamAddress,
    pub value: Option<ParamValue>,
    pub metadata: BTreeMap<String, Value>,
    /// Assigned by the bus on publish; 0 until then. Global per logical
    /// update, used for cross-consumer debugging, not conflict resolution.
    pub sequence: u64,
    pub observed_at: DateTime<Utc>,
}

impl ParamUpdate {
    pub fn new(device_id: impl Into<String>, address: ParamAddress, value: Option<ParamValue>) -> Self {
        Self {
            device_id: device_id.into(),
            address,
            value,
            metadata: BTreeMap::new(),
            sequence: 0,
            observed_at: Utc::now(),
        }
    }
}

/// Normalize a full REST prime snapshot: a nested mapping keyed by
/// device id -> pool -> index -> channel -> value-or-meta-dict.
pub fn normalize_prime(payload: &Value) -> Vec<ParamUpdate> {
    normalize(payload, "prime")
}

/// Normalize a realtime delta payload. Same shape as a prime snapshot,
/// narrower scope (one or a few parameters).
pub fn normalize_delta(payload: &Value) -> Vec<ParamUpdate> {
    normalize(payload, "delta")
}

fn normalize(payload: &Value, source: &str) -> Vec<ParamUpdate> {
    let mut updates = Vec::new();

    let devices = match payload.as_object() {
        Some(map) => map,
        None => {
            warn!(%source, "snapshot payload is not an object, ignoring");
            return updates;
        }
    };

    for (device_id, pools) in devices {
        let pools = match pools.as_object() {
            Some(map) => map,
            None => {
                warn!(%device_id, "device entry is not an object, skipping");
                continue;
            }
        };
        for (pool, indices) in pools {
            let indices = match indices.as_object() {
                Some(map) => map,
                None => continue,
            };
            for (index, channels) in indices {
                let channels = match channels.as_object() {
                    Some(map) => map,
                    None => continue,
                };
                for (channel, leaf) in channels {
                    match normalize_leaf(device_id, pool, index, channel, leaf, source) {
                        Some(update) => updates.push(update),
                        None => {
                            warn!(%device_id, %pool, %index, %channel, "unresolvable fragment dropped");
                        }
                    }
                }
            }
        }
    }

    trace!(%source, count = updates.len(), "normalized payload");
    updates
}

fn normalize_leaf(
    device_id: &str,
    pool: &str,
    index: &str,
    channel: &str,
    leaf: &Value,
    source: &str,
) -> Option<ParamUpdate> {
    let address = derive_address(pool, channel, index)?;

    let (value, mut metadata) = match leaf {
        Value::Object(meta) => {
            let value = meta.get("value").and_then(ParamValue::from_json);
            let metadata: BTreeMap<String, Value> = meta
                .iter()
                .filter(|(k, _)| k.as_str() != "value")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (value, metadata)
        }
        scalar => (ParamValue::from_json(scalar), BTreeMap::new()),
    };

    // A bare null leaf is metadata-only with nothing else to say; keep it,
    // the store treats it as a no-op.
    metadata.insert("source".to_string(), Value::String(source.to_string()));

    let mut update = ParamUpdate::new(device_id, address, value);
    update.metadata = metadata;
    Some(update)
}

fn derive_address(pool: &str, channel: &str, index: &str) -> Option<ParamAddress> {
    let mut chars = channel.chars();
    let letter = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let channel = Channel::from_letter(letter)?;
    let index: u32 = index.parse().ok()?;
    if !pool.starts_with('P')
        || pool.len() < 2
        || !pool[1..].bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some(ParamAddress::new(pool, channel, index))
}
