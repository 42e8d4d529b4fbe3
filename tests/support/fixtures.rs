//! Real Las Vegas / Henderson locations (OpenStreetMap), routable with the
//! OSRM Nevada extract.

use distribution_planner::model::{ClientPoint, Coordinate};

#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng).unwrap()
    }

    /// Client record already carrying coordinates.
    pub fn client(&self) -> ClientPoint {
        ClientPoint::with_coordinate(self.name, self.coordinate())
    }

    /// Client record that still needs geocoding; the address is the name.
    pub fn unlocated_client(&self) -> ClientPoint {
        ClientPoint::with_address(self.name, self.name)
    }
}

pub const CASINOS: &[Location] = &[
    Location::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Location::new("Encore at Wynn", 36.1289345, -115.1653620),
    Location::new("MGM Grand", 36.1023654, -115.1688720),
    Location::new("Bellagio", 36.1126, -115.1767),
    Location::new("Caesars Palace", 36.1162, -115.1745),
    Location::new("Longhorn Casino", 36.1070664, -115.0591256),
];

pub const STRIP_RESTAURANTS: &[Location] = &[
    Location::new("Hard Rock Cafe", 36.1041592, -115.1722166),
    Location::new("SW Steakhouse", 36.1262145, -115.1669146),
    Location::new("Sinatra", 36.1300035, -115.1654850),
    Location::new("Public House", 36.1219193, -115.1689317),
    Location::new("Brooklyn Bowl", 36.1175388, -115.1695094),
    Location::new("Gordon Ramsay BurGR", 36.1107195, -115.1720818),
    Location::new("Spago by Wolfgang Puck", 36.1139368, -115.1741462),
    Location::new("Otto Pizzeria", 36.1231219, -115.1684514),
    Location::new("Rao's", 36.1163982, -115.1763053),
    Location::new("Il Fornaio", 36.1024474, -115.1740110),
];

pub const HENDERSON_LOCATIONS: &[Location] = &[
    Location::new("I Love Sushi Henderson", 35.9916660, -115.1028343),
    Location::new("Islander's Grill", 36.0335058, -114.9856162),
    Location::new("Naga", 36.0137634, -114.9928676),
    Location::new("RibCage", 35.9949754, -115.0999810),
    Location::new("Green Valley Ranch Area", 36.0308, -115.0825),
];

pub const NORTH_VEGAS_LOCATIONS: &[Location] = &[
    Location::new("Rivas Mexican Grill North", 36.1450055, -115.0482587),
    Location::new("Roberto's Taco Shop", 36.1452953, -115.0478347),
    Location::new("Monarca Mexican Restaurant", 36.1440711, -115.0634197),
    Location::new("Pizza Hut North", 36.1443292, -115.0624966),
    Location::new("La Costa del Sol", 36.1470458, -115.0644345),
];

/// A distant stop, well outside the metro area (Boulder City).
pub const BOULDER_CITY: Location = Location::new("Boulder City Hall", 35.9786, -114.8325);

/// Six tightly packed strip stops plus one outlier ~40 km away.
pub fn strip_with_outlier() -> Vec<Location> {
    let mut locations: Vec<Location> = STRIP_RESTAURANTS[..6].to_vec();
    locations.push(BOULDER_CITY);
    locations
}

/// All fixture locations in a stable order.
pub fn metro_area() -> Vec<Location> {
    CASINOS
        .iter()
        .chain(STRIP_RESTAURANTS)
        .chain(HENDERSON_LOCATIONS)
        .chain(NORTH_VEGAS_LOCATIONS)
        .cloned()
        .collect()
}
