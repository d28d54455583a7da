//! Storage and call names the naming registries expose

pub const ROOT_MODULE: &str = "RootDNSModule";
pub const TLD_MAP: &str = "TLDMap";
pub const REGISTER_TLD_CALL: &str = "register_tld";

pub const TLD_MODULE: &str = "TldModule";
pub const DOMAIN_MAP: &str = "DomainMap";
pub const REGISTER_DOMAIN_CALL: &str = "register_domain";

pub const SYSTEM_MODULE: &str = "System";
pub const ACCOUNT_MAP: &str = "Account";
pub const EVENTS_MAP: &str = "Events";

pub const ASSET_MODULE: &str = "AssetDiscoveryModule";
pub const REGISTER_ASSET_CALL: &str = "register_asset_for_domain";
