//! Geo resolution chain
//!
//! Evaluated once per request: platform metadata, CDN viewer headers,
//! explicit x-geo-* headers, then an IP range lookup. The first source
//! producing a non-empty country wins.

use csv::ReaderBuilder;
use http::HeaderMap;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use tracing::warn;

use crate::models::{GeoContext, GeoSource};
use crate::{Error, Result};

/// Geo metadata from an edge runtime fronting the service; the HTTP layer
/// lifts the runtime's request annotations into this extension before
/// capture runs
#[derive(Debug, Clone, Default)]
pub struct PlatformGeo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// One row of the bundled `start,end,country` table
#[derive(Debug, Deserialize)]
struct GeoRangeRecord {
    start: String,
    end: String,
    country: String,
}

#[derive(Debug, Clone)]
struct IpRange {
    start: u128,
    end: u128,
    country: String,
}

/// Sorted IP range table loaded at startup
#[derive(Debug, Default)]
pub struct IpRangeDb {
    ranges: Vec<IpRange>,
}

impl IpRangeDb {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Config(format!("Failed to read geo db {:?}: {}", path, e)))?;
        Self::from_reader(file)
    }

    fn from_reader<R: std::io::Read>(input: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(input);

        let mut ranges = Vec::new();
        for result in reader.deserialize() {
            let record: GeoRangeRecord =
                result.map_err(|e| Error::Config(format!("geo db: {}", e)))?;
            let start = parse_ip(&record.start).ok_or_else(|| {
                Error::Config(format!("geo db: bad start ip '{}'", record.start))
            })?;
            let end = parse_ip(&record.end).ok_or_else(|| {
                Error::Config(format!("geo db: bad end ip '{}'", record.end))
            })?;
            ranges.push(IpRange {
                start,
                end,
                country: record.country.to_uppercase(),
            });
        }
        ranges.sort_by_key(|r| r.start);
        Ok(Self { ranges })
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<&str> {
        let key = ip_to_u128(ip);
        let idx = self.ranges.partition_point(|r| r.start <= key);
        if idx == 0 {
            return None;
        }
        let range = &self.ranges[idx - 1];
        (range.end >= key).then_some(range.country.as_str())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

pub struct GeoResolver {
    ip_db: Option<IpRangeDb>,
}

impl GeoResolver {
    pub fn new(ip_db: Option<IpRangeDb>) -> Self {
        Self { ip_db }
    }

    /// Build from config; a missing or unreadable table downgrades the ip
    /// source instead of failing startup
    pub fn from_config(config: &crate::config::SnapshotConfig) -> Self {
        let ip_db = config.geo_db_path.as_ref().and_then(|path| {
            match IpRangeDb::load(Path::new(path)) {
                Ok(db) => Some(db),
                Err(e) => {
                    warn!(error = %e, "geo ip table unavailable; ip source disabled");
                    None
                }
            }
        });
        Self { ip_db }
    }

    /// Walk the chain; the first non-empty country wins
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        platform: Option<&PlatformGeo>,
        peer_ip: Option<IpAddr>,
    ) -> GeoContext {
        if let Some(geo) = platform.and_then(platform_geo) {
            return geo;
        }
        if let Some(geo) = cdn_headers(headers) {
            return geo;
        }
        if let Some(geo) = explicit_headers(headers) {
            return geo;
        }
        if let Some(geo) = self.ip_lookup(headers, peer_ip) {
            return geo;
        }
        GeoContext::empty()
    }

    fn ip_lookup(&self, headers: &HeaderMap, peer_ip: Option<IpAddr>) -> Option<GeoContext> {
        let db = self.ip_db.as_ref()?;
        let ip = forwarded_for(headers).or(peer_ip)?;
        let country = db.lookup(ip)?;
        Some(GeoContext {
            country: Some(country.to_string()),
            region: None,
            city: None,
            lat: None,
            lon: None,
            source: GeoSource::Ip,
        })
    }
}

fn platform_geo(platform: &PlatformGeo) -> Option<GeoContext> {
    let country = platform.country.as_deref().filter(|c| !c.is_empty())?;
    Some(GeoContext {
        country: Some(country.to_string()),
        region: platform.region.clone(),
        city: platform.city.clone(),
        lat: platform.lat,
        lon: platform.lon,
        source: GeoSource::Platform,
    })
}

fn cdn_headers(headers: &HeaderMap) -> Option<GeoContext> {
    let country = header_str(headers, "cloudfront-viewer-country")?;
    Some(GeoContext {
        country: Some(country),
        region: header_str(headers, "cloudfront-viewer-country-region"),
        city: header_str(headers, "cloudfront-viewer-city"),
        lat: header_f64(headers, "cloudfront-viewer-latitude"),
        lon: header_f64(headers, "cloudfront-viewer-longitude"),
        source: GeoSource::Platform,
    })
}

fn explicit_headers(headers: &HeaderMap) -> Option<GeoContext> {
    let country = header_str(headers, "x-geo-country")?;
    Some(GeoContext {
        country: Some(country),
        region: header_str(headers, "x-geo-region"),
        city: header_str(headers, "x-geo-city"),
        lat: header_f64(headers, "x-geo-lat"),
        lon: header_f64(headers, "x-geo-lon"),
        source: GeoSource::Header,
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    header_str(headers, name).and_then(|v| v.parse().ok())
}

fn parse_ip(s: &str) -> Option<u128> {
    s.parse::<IpAddr>().ok().map(ip_to_u128)
}

fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}
