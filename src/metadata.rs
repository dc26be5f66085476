//! Remote party metadata: entity descriptors parsed, defaulted and indexed by entityID.

mod cache;
mod duration;
mod entity;
mod error;
mod information;
mod parser;
mod refresh;

pub use cache::{DEFAULT_CACHE_DURATION, MetadataCache, UpdateCallback};
pub use duration::parse_xs_duration;
pub use entity::{
    Endpoint, EndpointKind, EntityRecord, KeyDescriptor, KeyUse, RoleDescriptor, RoleKind,
};
pub use error::{MetadataError, MetadataResult};
pub use information::{EntityInformation, parse_sp_metadata};
pub use parser::{parse_document, parse_timestamp};
pub use refresh::MetadataRefresher;
