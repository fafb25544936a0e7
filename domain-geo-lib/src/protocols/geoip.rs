//! MaxMind country database (GeoLite2-Country / GeoIP2-Country).

use crate::error::GeoScanError;
use crate::protocols::CountryLookup;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;

/// Read-only country database handle, opened once and shared by all workers.
pub struct MaxMindCountryDb {
    reader: Reader<Vec<u8>>,
}

impl MaxMindCountryDb {
    /// Open the database file. Failure is fatal for the run.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoScanError> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|e| {
            GeoScanError::file_error(
                path.to_string_lossy(),
                format!("Failed to open geo-IP database: {}", e),
            )
        })?;
        Ok(Self { reader })
    }

    /// Database type string from the metadata, e.g. `GeoLite2-Country`.
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }
}

impl CountryLookup for MaxMindCountryDb {
    fn country_code(&self, ip: IpAddr) -> Result<Option<String>, GeoScanError> {
        match self.reader.lookup::<geoip2::Country>(ip) {
            Ok(record) => Ok(record
                .country
                .and_then(|country| country.iso_code)
                .map(String::from)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(GeoScanError::geoip(Some(ip), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_missing_database() {
        let result = MaxMindCountryDb::open("/nonexistent/GeoLite2-Country.mmdb");
        assert!(matches!(result, Err(GeoScanError::FileError { .. })));
    }

    #[test]
    fn test_open_garbage_database() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a maxmind database").unwrap();
        file.flush().unwrap();

        assert!(MaxMindCountryDb::open(file.path()).is_err());
    }
}
