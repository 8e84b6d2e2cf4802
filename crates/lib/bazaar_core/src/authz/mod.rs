//! Authorization: the permission catalogue, policy-string requirements and
//! the cached per-user authorization data they are checked against.

pub mod permissions;
pub mod policy;
pub mod provider;

pub use policy::{AuthorizationRequirement, RequirementFailure};
pub use provider::{
    AuthorizationCacheSettings, AuthorizationDataProvider, AuthorizationSource,
    StoreAuthorizationSource,
};
