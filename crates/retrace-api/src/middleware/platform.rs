//! Edge-runtime platform metadata
//!
//! When the service runs behind an edge runtime that annotates requests
//! with resolved geo (the `x-vercel-ip-*` header family), this middleware
//! lifts those annotations into a typed `PlatformGeo` extension before the
//! snapshot capture runs, so the resolver's platform source sees them
//! ahead of CDN and explicit headers.

use axum::{
    body::Body,
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use retrace_core::snapshot::PlatformGeo;

pub async fn platform_geo_middleware(mut request: Request<Body>, next: Next) -> Response {
    if let Some(geo) = platform_geo_from_headers(request.headers()) {
        request.extensions_mut().insert(geo);
    }
    next.run(request).await
}

fn platform_geo_from_headers(headers: &HeaderMap) -> Option<PlatformGeo> {
    let country = header_str(headers, "x-vercel-ip-country")?;
    Some(PlatformGeo {
        country: Some(country),
        region: header_str(headers, "x-vercel-ip-country-region"),
        city: header_str(headers, "x-vercel-ip-city"),
        lat: header_f64(headers, "x-vercel-ip-latitude"),
        lon: header_f64(headers, "x-vercel-ip-longitude"),
    })
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

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_full_annotation_set() {
        let geo = platform_geo_from_headers(&headers(&[
            ("x-vercel-ip-country", "SE"),
            ("x-vercel-ip-country-region", "AB"),
            ("x-vercel-ip-city", "Stockholm"),
            ("x-vercel-ip-latitude", "59.33"),
            ("x-vercel-ip-longitude", "18.06"),
        ]))
        .unwrap();

        assert_eq!(geo.country.as_deref(), Some("SE"));
        assert_eq!(geo.region.as_deref(), Some("AB"));
        assert_eq!(geo.city.as_deref(), Some("Stockholm"));
        assert_eq!(geo.lat, Some(59.33));
        assert_eq!(geo.lon, Some(18.06));
    }

    #[test]
    fn test_country_alone_is_enough() {
        let geo = platform_geo_from_headers(&headers(&[("x-vercel-ip-country", "NO")])).unwrap();
        assert_eq!(geo.country.as_deref(), Some("NO"));
        assert!(geo.city.is_none());
    }

    #[test]
    fn test_absent_or_empty_country_yields_nothing() {
        assert!(platform_geo_from_headers(&HeaderMap::new()).is_none());
        assert!(platform_geo_from_headers(&headers(&[("x-vercel-ip-country", " ")])).is_none());
        assert!(
            platform_geo_from_headers(&headers(&[("x-vercel-ip-city", "Oslo")])).is_none()
        );
    }

    #[test]
    fn test_unparsable_coordinates_dropped() {
        let geo = platform_geo_from_headers(&headers(&[
            ("x-vercel-ip-country", "DE"),
            ("x-vercel-ip-latitude", "north"),
        ]))
        .unwrap();
        assert_eq!(geo.country.as_deref(), Some("DE"));
        assert!(geo.lat.is_none());
    }
}
