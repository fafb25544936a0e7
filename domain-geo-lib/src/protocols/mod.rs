//! External collaborators of the pipeline.
//!
//! The pool only sees two traits: a [`Resolver`] turning a domain into an
//! address string, and a [`CountryLookup`] turning an address into a country
//! code. The production implementations live in the submodules.

use crate::error::GeoScanError;
use std::future::Future;
use std::net::IpAddr;

/// DNS-over-HTTPS JSON resolver
pub mod doh;

/// MaxMind country database
pub mod geoip;

pub use doh::{extract_answer, DohResolver};
pub use geoip::MaxMindCountryDb;

/// Resolve a domain to an address string.
///
/// `Ok("")` means the resolver had no answer. The string is not validated;
/// the caller decides whether it is an IP literal. Errors should be
/// retryable (see [`GeoScanError::is_retryable`]) when a later attempt could
/// succeed.
pub trait Resolver: Send + Sync {
    fn resolve(&self, domain: &str)
        -> impl Future<Output = Result<String, GeoScanError>> + Send;
}

/// Map an address to its ISO country code.
///
/// `Ok(None)` means the database has no country for the address. Errors
/// abort the run.
pub trait CountryLookup: Send + Sync {
    fn country_code(&self, ip: IpAddr) -> Result<Option<String>, GeoScanError>;
}
