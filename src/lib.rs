mod address;
mod bundle;
mod bus;
mod catalog;
mod error;
mod event;
mod gateway;
mod menu;
mod store;

pub use address::{Channel, ParamAddress};
pub use bundle::{
    extract_i18n, extract_mappings, extract_menu, MappingChannels, ParamMapping, StatusCondition,
};
pub use bus::{EventBus, Subscription};
pub use catalog::{AssetCatalog, AssetFetcher, HttpAssetFetcher, ModuleModel, SymbolDescriptor};
pub use error::{Error, ResolutionPhase, Result};
pub use event::{normalize_delta, normalize_prime, ParamUpdate, ParamValue};
pub use gateway::{PortalGateway, PortalGatewayBuilder};
pub use menu::{
    filter_menu, CommandRule, MenuNode, ParamRef, RefKind, RuleBranch, RuleCondition, RuleLogic,
};
pub use store::{ParamFamily, ParamStore};
