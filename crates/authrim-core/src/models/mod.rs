//! Domain models

pub mod challenge;
pub mod claims_request;
pub mod client;
pub mod code;
pub mod device;
pub mod family;
pub mod role;
pub mod user;

pub use challenge::Challenge;
pub use claims_request::{ClaimRequirement, ClaimsRequest};
pub use client::{Client, GrantType};
pub use code::AuthorizationCodeRecord;
pub use device::{DeviceCodeRecord, DeviceCodeStatus};
pub use family::RefreshTokenFamily;
pub use role::Role;
pub use user::User;
