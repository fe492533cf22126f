//! Real Las Vegas parking locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. Garages sit a few hundred meters
//! to a few kilometers apart, so fallback routes between them are not
//! clamped at the upper bound.

use parking_nav::LonLat;
use parking_nav::session::Destination;

/// A named parking location.
#[derive(Debug, Clone)]
pub struct ParkingSpot {
    pub id: &'static str,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl ParkingSpot {
    pub const fn new(id: &'static str, name: &'static str, lat: f64, lng: f64) -> Self {
        Self { id, name, lat, lng }
    }

    pub fn position(&self) -> LonLat {
        LonLat(self.lng, self.lat)
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.name, self.position()).with_spot(self.id)
    }
}

pub const GARAGES: &[ParkingSpot] = &[
    ParkingSpot::new("spot-wynn", "Wynn Self Parking", 36.1263781, -115.1658180),
    ParkingSpot::new("spot-mgm", "MGM Grand Garage", 36.1023654, -115.1688720),
    ParkingSpot::new("spot-bellagio", "Bellagio Self Parking", 36.1126, -115.1767),
    ParkingSpot::new("spot-caesars", "Caesars Palace Garage", 36.1162, -115.1745),
    ParkingSpot::new("spot-linq", "LINQ Parking Garage", 36.1175388, -115.1695094),
];

/// Starting point on the Strip, outside the Hard Rock Cafe.
pub const STRIP_START: ParkingSpot = ParkingSpot::new("start", "Hard Rock Cafe", 36.1041592, -115.1722166);

pub fn garage(id: &str) -> &'static ParkingSpot {
    GARAGES
        .iter()
        .find(|spot| spot.id == id)
        .unwrap_or_else(|| panic!("unknown garage fixture {}", id))
}
