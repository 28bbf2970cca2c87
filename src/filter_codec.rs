// Encoding and decoding of listing filters to and from the URL query.
// Every filter state has exactly one canonical encoding: keys in alphabetical
// order, set values sorted, default ranges and page 1 omitted.

use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeSet;
use url::form_urlencoded;

use crate::models::{FilterSet, Fuel, RangeFilter, Transmission};

pub const KEY_ANIO: &str = "anio";
pub const KEY_CAJA: &str = "caja";
pub const KEY_COMBUSTIBLE: &str = "combustible";
pub const KEY_KM: &str = "km";
pub const KEY_MARCA: &str = "marca";
pub const KEY_MODELO: &str = "modelo";
pub const KEY_PAGE: &str = "page";
pub const KEY_PRECIO: &str = "precio";
pub const KEY_SORT: &str = "sort";

// Parameters that may appear in an indexable canonical URL
const CANONICAL_ALLOW: [&str; 6] = [KEY_ANIO, KEY_CAJA, KEY_COMBUSTIBLE, KEY_MARCA, KEY_MODELO, KEY_PRECIO];
// Known listing parameters that are valid but make the page non-indexable
const NOINDEX_PARAMS: [&str; 3] = [KEY_PAGE, KEY_SORT, KEY_KM];
// Tracking parameters, stripped without affecting indexing
const CANONICAL_DENY: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
];

/// Default range pairs. A range equal to its default is "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDefaults {
    pub anio: RangeFilter,
    pub precio: RangeFilter,
    pub km: RangeFilter,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        let current_year = i64::from(chrono::Local::now().year());
        Self {
            anio: RangeFilter { min: 1990, max: current_year.max(1990) },
            precio: RangeFilter { min: 0, max: 100_000_000 },
            km: RangeFilter { min: 0, max: 500_000 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Robots {
    #[serde(rename = "index,follow")]
    Index,
    #[serde(rename = "noindex,follow")]
    NoIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalUrl {
    pub query: String,
    pub robots: Robots,
}

#[derive(Debug, Clone)]
pub struct FilterCodec {
    defaults: FilterDefaults,
}

impl FilterCodec {
    pub fn new(defaults: FilterDefaults) -> Self {
        Self { defaults }
    }

    pub fn encode(&self, filters: &FilterSet) -> String {
        let mut pairs: Vec<(&'static str, String)> = Vec::new();

        push_set(&mut pairs, KEY_MARCA, filters.marca.iter().map(String::as_str));
        push_set(&mut pairs, KEY_MODELO, filters.modelo.iter().map(String::as_str));
        push_set(&mut pairs, KEY_CAJA, filters.caja.iter().map(|c| c.label()));
        push_set(&mut pairs, KEY_COMBUSTIBLE, filters.combustible.iter().map(|f| f.label()));

        for (key, range, default) in [
            (KEY_ANIO, filters.anio, self.defaults.anio),
            (KEY_PRECIO, filters.precio, self.defaults.precio),
            (KEY_KM, filters.km, self.defaults.km),
        ] {
            if let Some(range) = range.filter(|r| *r != default) {
                pairs.push((key, format!("{},{}", range.min, range.max)));
            }
        }

        if filters.page > 1 {
            pairs.push((KEY_PAGE, filters.page.to_string()));
        }

        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Decodes already percent-decoded pairs. Malformed values are dropped
    /// silently; unknown keys are ignored.
    pub fn decode<I, K, V>(&self, pairs: I) -> FilterSet
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filters = FilterSet::default();

        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                KEY_MARCA => filters.marca.extend(split_set(value).map(str::to_string)),
                KEY_MODELO => filters.modelo.extend(split_set(value).map(str::to_string)),
                KEY_CAJA => filters.caja.extend(parse_enum_set(KEY_CAJA, value, Transmission::parse)),
                KEY_COMBUSTIBLE => filters.combustible.extend(parse_enum_set(KEY_COMBUSTIBLE, value, Fuel::parse)),
                KEY_ANIO => filters.anio = self.decode_range(KEY_ANIO, value, self.defaults.anio),
                KEY_PRECIO => filters.precio = self.decode_range(KEY_PRECIO, value, self.defaults.precio),
                KEY_KM => filters.km = self.decode_range(KEY_KM, value, self.defaults.km),
                KEY_PAGE => filters.page = decode_page(value),
                _ => {}
            }
        }

        filters
    }

    /// Decodes a raw query string (with or without the leading `?`).
    pub fn decode_query(&self, query: &str) -> FilterSet {
        self.decode(parse_query(query))
    }

    /// Brings a filter set built by hand into canonical form. The comma is
    /// the set separator, so an element containing one is split in two.
    pub fn normalize(&self, mut filters: FilterSet) -> FilterSet {
        filters.marca = normalize_strings(filters.marca);
        filters.modelo = normalize_strings(filters.modelo);
        filters.anio = filters.anio.filter(|r| *r != self.defaults.anio);
        filters.precio = filters.precio.filter(|r| *r != self.defaults.precio);
        filters.km = filters.km.filter(|r| *r != self.defaults.km);
        filters.page = filters.page.max(1);
        filters
    }

    /// Canonical query and robots directive for an incoming parameter list.
    pub fn canonical<I, K, V>(&self, pairs: I) -> CanonicalUrl
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut robots = Robots::Index;
        let mut kept = Vec::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            if CANONICAL_ALLOW.contains(&key) {
                kept.push((key.to_string(), value.as_ref().to_string()));
            } else if NOINDEX_PARAMS.contains(&key) {
                robots = Robots::NoIndex;
            } else if !CANONICAL_DENY.contains(&key) {
                tracing::debug!(param = key, "Unknown query parameter, marking listing noindex");
                robots = Robots::NoIndex;
            }
        }

        CanonicalUrl { query: self.encode(&self.decode(kept)), robots }
    }

    fn decode_range(&self, key: &str, value: &str, default: RangeFilter) -> Option<RangeFilter> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        let range = match parts.as_slice() {
            [min, max] => match (min.parse::<i64>(), max.parse::<i64>()) {
                (Ok(min), Ok(max)) => RangeFilter::new(min, max),
                _ => None,
            },
            _ => None,
        };

        match range {
            Some(range) if range == default => None,
            Some(range) => Some(range),
            None => {
                tracing::debug!(param = key, value, "Dropping malformed range filter");
                None
            }
        }
    }
}

impl Default for FilterCodec {
    fn default() -> Self {
        Self::new(FilterDefaults::default())
    }
}

/// Splits a query string into percent-decoded pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

// Values are sorted by their label and escaped one by one, so the separating
// comma stays literal.
fn push_set<'a>(pairs: &mut Vec<(&'static str, String)>, key: &'static str, values: impl Iterator<Item = &'a str>) {
    let mut values: Vec<&str> = values.filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return;
    }
    values.sort_unstable();
    let joined = values
        .into_iter()
        .map(|value| form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join(",");
    pairs.push((key, joined));
}

// Empty elements ("a,,b" or a trailing comma) are discarded.
fn split_set(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

fn parse_enum_set<'a, T: 'a>(key: &'a str, value: &'a str, parse: fn(&str) -> Option<T>) -> impl Iterator<Item = T> + 'a {
    split_set(value).filter_map(move |raw| {
        let parsed = parse(raw);
        if parsed.is_none() {
            tracing::debug!(param = key, value = raw, "Dropping unknown filter value");
        }
        parsed
    })
}

fn decode_page(value: &str) -> u32 {
    match value.trim().parse::<u32>() {
        Ok(page) if page >= 1 => page,
        _ => {
            tracing::debug!(value, "Invalid page parameter, using page 1");
            1
        }
    }
}

fn normalize_strings(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .iter()
        .flat_map(|v| split_set(v))
        .map(str::to_string)
        .collect()
}
