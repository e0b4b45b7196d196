//! Geolocation module for detecting proxy IP location using MMDB

use crate::Result;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Geographic location information for an IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "CN")
    pub country_code: Option<String>,
    /// Country name in English
    pub country_name: Option<String>,
    /// City name in English
    pub city_name: Option<String>,
    /// Continent code (e.g., "NA", "EU", "AS")
    pub continent_code: Option<String>,
    /// Latitude coordinate
    pub latitude: Option<f64>,
    /// Longitude coordinate
    pub longitude: Option<f64>,
    /// Timezone (e.g., "America/New_York")
    pub timezone: Option<String>,
}

impl GeoLocation {
    /// Create a new GeoLocation with country information
    pub fn with_country(country_code: Option<String>, country_name: Option<String>) -> Self {
        Self {
            country_code,
            country_name,
            ..Default::default()
        }
    }

    /// Check if the location has any meaningful data
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none()
            && self.country_name.is_none()
            && self.city_name.is_none()
            && self.continent_code.is_none()
    }

    /// Whether the location passes a country allow-list.
    ///
    /// An empty list accepts everything; an unknown country never matches a
    /// non-empty list.
    pub fn matches_countries(&self, countries: &[String]) -> bool {
        if countries.is_empty() {
            return true;
        }
        match &self.country_code {
            Some(code) => countries.iter().any(|c| c.eq_ignore_ascii_case(code)),
            None => false,
        }
    }

    /// Get a short display string for the location
    pub fn short_display(&self) -> String {
        match (&self.country_code, &self.city_name) {
            (Some(cc), Some(city)) => format!("{}, {}", city, cc),
            (Some(cc), None) => cc.clone(),
            (None, Some(city)) => city.clone(),
            (None, None) => String::from("Unknown"),
        }
    }
}

/// GeoLocator for looking up IP addresses in MMDB databases
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Create a new GeoLocator from an MMDB file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up the geolocation for an IP address string
    pub fn lookup(&self, ip_str: &str) -> Result<GeoLocation> {
        let ip: IpAddr = ip_str.parse()?;
        self.lookup_ip(ip)
    }

    /// Look up the geolocation for an IpAddr
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoLocation> {
        let lookup_result = self.reader.lookup(ip)?;

        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(GeoLocation::default());
        };

        Ok(GeoLocation {
            country_code: city.country.iso_code.map(String::from),
            country_name: city.country.names.english.map(String::from),
            city_name: city.city.names.english.map(String::from),
            continent_code: city.continent.code.map(String::from),
            latitude: city.location.latitude,
            longitude: city.location.longitude,
            timezone: city.location.time_zone.map(String::from),
        })
    }
}

/// Resolves candidate hosts to locations, tolerating a missing database
#[derive(Clone, Default)]
pub struct GeoResolver {
    locator: Option<GeoLocator>,
}

impl GeoResolver {
    /// Open the database at `path`, falling back to unknown locations when
    /// it cannot be read
    pub fn from_optional_path(path: Option<&Path>) -> Self {
        let locator = path.and_then(|p| match GeoLocator::from_path(p) {
            Ok(locator) => Some(locator),
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "GeoIP database unavailable");
                None
            }
        });
        Self { locator }
    }

    pub fn is_enabled(&self) -> bool {
        self.locator.is_some()
    }

    /// Best-effort lookup; failures yield an empty location
    pub fn locate(&self, host: &str) -> GeoLocation {
        match &self.locator {
            Some(locator) => locator.lookup(host).unwrap_or_default(),
            None => GeoLocation::default(),
        }
    }
}
