pub mod api;
pub mod config;

pub use api::{PartnerError, PartnerResult, PartnerServiceProxy};
pub use config::PartnerServiceConfiguration;
