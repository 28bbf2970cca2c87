// Data structures shared by the codec, mapper, store and controller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive numeric range. Always `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RangeFilter {
    pub min: i64,
    pub max: i64,
}

impl RangeFilter {
    pub fn new(min: i64, max: i64) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }
}

// Gearbox values accepted in the `caja` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Transmission {
    Manual,
    Automatica,
    Secuencial,
}

impl Transmission {
    pub fn label(self) -> &'static str {
        match self {
            Transmission::Manual => "Manual",
            Transmission::Automatica => "Automatica",
            Transmission::Secuencial => "Secuencial",
        }
    }

    /// Case-insensitive; accepts the English names too.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "manual" => Some(Transmission::Manual),
            "automatica" | "automática" | "automatic" => Some(Transmission::Automatica),
            "secuencial" | "sequential" => Some(Transmission::Secuencial),
            _ => None,
        }
    }
}

// Fuel values accepted in the `combustible` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fuel {
    Nafta,
    Diesel,
    Gnc,
    Hibrido,
    Electrico,
}

impl Fuel {
    pub fn label(self) -> &'static str {
        match self {
            Fuel::Nafta => "Nafta",
            Fuel::Diesel => "Diesel",
            Fuel::Gnc => "GNC",
            Fuel::Hibrido => "Hibrido",
            Fuel::Electrico => "Electrico",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "nafta" | "gasoline" | "petrol" => Some(Fuel::Nafta),
            "diesel" | "diésel" => Some(Fuel::Diesel),
            "gnc" | "cng" => Some(Fuel::Gnc),
            "hibrido" | "híbrido" | "hybrid" => Some(Fuel::Hibrido),
            "electrico" | "eléctrico" | "electric" => Some(Fuel::Electrico),
            _ => None,
        }
    }
}

/// Typed filter state behind a listing URL.
///
/// A range set to `None` means "use the configured default"; the codec
/// normalizes a range equal to its default to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    pub marca: BTreeSet<String>,
    pub modelo: BTreeSet<String>,
    pub caja: BTreeSet<Transmission>,
    pub combustible: BTreeSet<Fuel>,
    pub anio: Option<RangeFilter>,
    pub precio: Option<RangeFilter>,
    pub km: Option<RangeFilter>,
    pub page: u32,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self {
            marca: BTreeSet::new(),
            modelo: BTreeSet::new(),
            caja: BTreeSet::new(),
            combustible: BTreeSet::new(),
            anio: None,
            precio: None,
            km: None,
            page: 1,
        }
    }
}

impl FilterSet {
    /// Same filters, pointed at another page.
    pub fn at_page(&self, page: u32) -> Self {
        Self { page: page.max(1), ..self.clone() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleImages {
    pub principal: Option<String>,
    pub hover: Option<String>,
    pub extra: Vec<String>,
}

// Normalized vehicle as shown in a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub price: Option<f64>,
    pub year: Option<i64>,
    pub mileage: Option<f64>,
    pub transmission: Option<String>,
    pub images: VehicleImages,
}

#[cfg(test)]
impl VehicleRecord {
    pub(crate) fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            brand: None,
            model: None,
            version: None,
            price: None,
            year: None,
            mileage: None,
            transmission: None,
            images: VehicleImages::default(),
        }
    }
}

/// One backend page after normalization. `next_page_cursor` is the
/// corrected cursor: strictly ahead of the requested one whenever
/// `has_next_page` holds, and `None` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedPage {
    pub vehicles: Vec<VehicleRecord>,
    pub total_docs: Option<u64>,
    pub has_next_page: bool,
    pub next_page_cursor: Option<u32>,
}

impl MappedPage {
    pub fn empty() -> Self {
        Self { total_docs: Some(0), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SortKey {
    #[default]
    None,
    PriceDesc,
    PriceAsc,
    KmDesc,
    KmAsc,
}

impl SortKey {
    /// Value of the `sort` URL parameter; `None` has no parameter.
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            SortKey::None => None,
            SortKey::PriceDesc => Some("precio_desc"),
            SortKey::PriceAsc => Some("precio_asc"),
            SortKey::KmDesc => Some("km_desc"),
            SortKey::KmAsc => Some("km_asc"),
        }
    }

    /// Unknown values fall back to `None`.
    pub fn from_param(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "precio_desc" | "price_desc" => SortKey::PriceDesc,
            "precio_asc" | "price_asc" => SortKey::PriceAsc,
            "km_desc" => SortKey::KmDesc,
            "km_asc" => SortKey::KmAsc,
            _ => SortKey::None,
        }
    }
}
