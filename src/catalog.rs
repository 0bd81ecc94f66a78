use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::{extract_i18n, extract_mappings, extract_menu, ParamMapping};
use crate::error::ResolutionPhase;
use crate::event::ParamValue;
use crate::menu::{filter_menu, MenuNode};
use crate::store::ParamStore;
use crate::{Error, Result};

/// Retrieval of raw asset bundle text. The core never performs network I/O
/// beyond this capability and never executes what it fetches.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Default fetcher over the portal's static asset host.
pub struct HttpAssetFetcher {
    http: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let text = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

/// Fully resolved module model for one `(device family, language)` pair:
/// localization table, per-symbol mappings and the navigation tree.
#[derive(Debug, Clone)]
pub struct ModuleModel {
    pub family: String,
    pub lang: String,
    /// Hash over the three source bundles, recorded for cache diagnostics.
    pub content_hash: u64,
    pub i18n: BTreeMap<String, String>,
    pub mappings: BTreeMap<String, ParamMapping>,
    pub menu: MenuNode,
    i18n_url: String,
    mapping_url: String,
}

impl ModuleModel {
    /// Localized label for an i18n key or symbolic parameter name.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.i18n
            .get(key)
            .or_else(|| self.i18n.get(&format!("params.{key}")))
            .map(String::as_str)
    }

    pub(crate) fn require_label(&self, key: &str) -> Result<String> {
        self.label(key)
            .map(str::to_string)
            .ok_or_else(|| Error::Resolution {
                phase: ResolutionPhase::Parse,
                url: self.i18n_url.clone(),
                detail: format!("no label for {key:?}"),
            })
    }

    /// Localized unit label for a raw unit code (`units.<code>` convention).
    pub fn unit_label(&self, code: &str) -> Option<&str> {
        self.i18n.get(&format!("units.{code}")).map(String::as_str)
    }

    /// Permission-filtered view of the menu tree.
    pub fn menu_for(&self, granted: &BTreeSet<String>) -> Result<Option<MenuNode>> {
        filter_menu(&self.menu, granted)
    }

    /// Join this model's static metadata for one symbol with the live values
    /// held in `store`. Live readings always win for value/status/min/max;
    /// labels and unit texts always come from the catalog; the unit code
    /// prefers the live unit channel and falls back to the bundle's static
    /// `units` field when nothing has been observed yet.
    pub fn describe_symbol(&self, symbol: &str, store: &ParamStore) -> Result<SymbolDescriptor> {
        let mapping = self.mappings.get(symbol).ok_or_else(|| Error::Resolution {
            phase: ResolutionPhase::Parse,
            url: self.mapping_url.clone(),
            detail: format!("unknown symbol {symbol:?}"),
        })?;

        let live = |addr: &Option<String>| addr.as_deref().and_then(|a| store.get(a));

        let value = live(&mapping.channels.value);
        let status_raw = live(&mapping.channels.status).and_then(|v| v.as_u32());
        let min = live(&mapping.channels.min);
        let max = live(&mapping.channels.max);

        let unit_code = live(&mapping.channels.unit)
            .map(|v| unit_code_text(&v))
            .or_else(|| mapping.units_source.clone());
        let unit = unit_code
            .as_deref()
            .map(|code| self.unit_label(code).unwrap_or(code).to_string());

        Ok(SymbolDescriptor {
            symbol: symbol.to_string(),
            label: self.label(symbol).map(str::to_string),
            value,
            status_raw,
            min,
            max,
            unit_code,
            unit,
            mapping: mapping.clone(),
        })
    }
}

fn unit_code_text(v: &ParamValue) -> String {
    match v {
        ParamValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        ParamValue::Number(n) => format!("{n}"),
        ParamValue::Text(s) => s.clone(),
        ParamValue::Bool(b) => format!("{b}"),
    }
}

/// UI-facing record built from catalog metadata joined with live store state,
/// consumed by the integration layer's entity generation.
#[derive(Debug, Clone)]
pub struct SymbolDescriptor {
    pub symbol: String,
    pub label: Option<String>,
    pub value: Option<ParamValue>,
    pub status_raw: Option<u32>,
    pub min: Option<ParamValue>,
    pub max: Option<ParamValue>,
    pub unit_code: Option<String>,
    pub unit: Option<String>,
    pub mapping: ParamMapping,
}

/// Orchestrates fetching, parsing and caching of asset bundles into module
/// models. Models are cached for the process lifetime per `(family, lang)`;
/// concurrent first-callers may double-fetch, resolved last-writer-wins.
pub struct AssetCatalog {
    fetcher: Arc<dyn AssetFetcher>,
    base_url: String,
    cache: Mutex<HashMap<(String, String), Arc<ModuleModel>>>,
}

impl AssetCatalog {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn i18n_url(&self, lang: &str) -> String {
        format!("{}/assets/i18n/{lang}.js", self.base_url)
    }

    fn mapping_url(&self, family: &str) -> String {
        format!("{}/assets/mappings/{family}.js", self.base_url)
    }

    fn menu_url(&self, family: &str) -> String {
        format!("{}/assets/menus/{family}.js", self.base_url)
    }

    /// Resolve the module model for a device family and language, fetching
    /// and parsing the bundles on first use. Fetch and parse failures
    /// surface as [`Error::Resolution`]; the caller opted into enrichment
    /// and needs to know it failed.
    pub async fn get_module_model(&self, family: &str, lang: &str) -> Result<Arc<ModuleModel>> {
        let key = (family.to_string(), lang.to_string());
        if let Some(model) = self.cache.lock().expect("catalog cache poisoned").get(&key) {
            return Ok(model.clone());
        }

        let i18n_url = self.i18n_url(lang);
        let mapping_url = self.mapping_url(family);
        let menu_url = self.menu_url(family);

        let i18n_src = self.fetch(&i18n_url).await?;
        let i18n = extract_i18n(&i18n_src).map_err(|e| parse_failure(&i18n_url, e))?;
        let mapping_src = self.fetch(&mapping_url).await?;
        let mappings = extract_mappings(&mapping_src).map_err(|e| parse_failure(&mapping_url, e))?;
        let menu_src = self.fetch(&menu_url).await?;
        let menu = extract_menu(&menu_src).map_err(|e| parse_failure(&menu_url, e))?;

        let mut hasher = DefaultHasher::new();
        (&i18n_src, &mapping_src, &menu_src).hash(&mut hasher);
        let content_hash = hasher.finish();

        debug!(%family, %lang, content_hash, symbols = mappings.len(), "module model resolved");

        let model = Arc::new(ModuleModel {
            family: family.to_string(),
            lang: lang.to_string(),
            content_hash,
            i18n,
            mappings,
            menu,
            i18n_url,
            mapping_url,
        });

        // Last-writer-wins on a concurrent first miss; the cache stays
        // consistent either way.
        self.cache
            .lock()
            .expect("catalog cache poisoned")
            .insert(key, model.clone());
        Ok(model)
    }

    /// Enrichment join for one symbol against a live store.
    pub async fn describe_symbol(
        &self,
        family: &str,
        lang: &str,
        symbol: &str,
        store: &ParamStore,
    ) -> Result<SymbolDescriptor> {
        let model = self.get_module_model(family, lang).await?;
        model.describe_symbol(symbol, store)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetcher
            .fetch_text(url)
            .await
            .map_err(|e| Error::Resolution {
                phase: ResolutionPhase::Fetch,
                url: url.to_string(),
                detail: e.to_string(),
            })
    }
}

fn parse_failure(url: &str, e: Error) -> Error {
    Error::Resolution {
        phase: ResolutionPhase::Parse,
        url: url.to_string(),
        detail: e.to_string(),
    }
}
