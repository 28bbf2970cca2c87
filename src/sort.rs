// Client-side ordering of the already loaded list. Never triggers a fetch.

use std::cmp::Ordering;

use crate::models::{SortKey, VehicleRecord};

impl SortKey {
    /// Numeric value compared for this key. A missing price or mileage
    /// compares as 0, so such vehicles lead ascending orders and trail
    /// descending ones.
    pub fn sort_value(self, vehicle: &VehicleRecord) -> f64 {
        let value = match self {
            SortKey::PriceAsc | SortKey::PriceDesc => vehicle.price,
            SortKey::KmAsc | SortKey::KmDesc => vehicle.mileage,
            SortKey::None => None,
        };
        value.filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}

/// Returns a re-ordered copy; `vehicles` is left untouched. The sort is
/// stable, so ties keep their loaded order.
pub fn project(vehicles: &[VehicleRecord], key: SortKey) -> Vec<VehicleRecord> {
    let mut projected = vehicles.to_vec();
    let descending = matches!(key, SortKey::PriceDesc | SortKey::KmDesc);

    match key {
        SortKey::None => {}
        _ => projected.sort_by(|a, b| {
            let ord = key.sort_value(a).partial_cmp(&key.sort_value(b)).unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        }),
    }

    projected
}
