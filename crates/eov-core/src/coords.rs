/// Coordinate reference systems and the point conversions the sampler needs.
/// All coordinate math uses f64 for precision.

use serde::{Deserialize, Serialize};

/// EPSG code of geographic WGS84 (lon/lat degrees).
pub const EPSG_WGS84: u32 = 4326;
/// EPSG code of spherical Web Mercator (metres).
pub const EPSG_WEB_MERCATOR: u32 = 3857;
/// Legacy codes that denote the same Web Mercator projection.
const WEB_MERCATOR_ALIASES: [u32; 2] = [900913, 3785];
/// Sphere radius used by Web Mercator, in metres.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// A point on the sphere in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Coordinate reference system attached to rasters and point sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    Epsg(u32),
    /// No georeferencing information was available.
    Unspecified,
}

impl Crs {
    pub fn wgs84() -> Self {
        Crs::Epsg(EPSG_WGS84)
    }

    pub fn is_web_mercator(&self) -> bool {
        match self {
            Crs::Epsg(code) => *code == EPSG_WEB_MERCATOR || WEB_MERCATOR_ALIASES.contains(code),
            Crs::Unspecified => false,
        }
    }

    /// Whether `to_wgs84` can convert coordinates expressed in this CRS.
    pub fn converts_to_wgs84(&self) -> bool {
        *self == Crs::wgs84() || self.is_web_mercator()
    }

    /// Convert native (x, y) to geographic coordinates.
    /// Returns None when this CRS has no known conversion.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Option<LatLon> {
        if *self == Crs::wgs84() {
            return Some(LatLon::new(y, x));
        }
        if self.is_web_mercator() {
            let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
            let lat = (y / WEB_MERCATOR_RADIUS).sinh().atan().to_degrees();
            return Some(LatLon::new(lat, lon));
        }
        None
    }

    /// Forward Web Mercator projection of a geographic point.
    pub fn web_mercator_from_latlon(ll: LatLon) -> (f64, f64) {
        let x = ll.lon.to_radians() * WEB_MERCATOR_RADIUS;
        let lat_rad = ll.lat.to_radians();
        let y = (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() * WEB_MERCATOR_RADIUS;
        (x, y)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Centroid of a closed or open polygon ring given as (x, y) vertices.
///
/// Uses the area-weighted shoelace formula; rings with zero area (collinear
/// or repeated vertices) fall back to the mean of their vertices.
/// Returns None for an empty ring.
pub fn polygon_centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    if ring.is_empty() {
        return None;
    }
    // Drop an explicit closing vertex; the wrap-around below closes the ring.
    let ring = if ring.len() > 1 && ring[0] == ring[ring.len() - 1] {
        &ring[..ring.len() - 1]
    } else {
        ring
    };

    let n = ring.len();
    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    if area2.abs() < f64::EPSILON {
        let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
        return Some((sx / n as f64, sy / n as f64));
    }
    Some((cx / (3.0 * area2), cy / (3.0 * area2)))
}
