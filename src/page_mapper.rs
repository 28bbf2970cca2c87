// Normalizes raw search backend pages into MappedPage.
// The backend payload is untrusted: anything unexpected degrades to an
// empty page instead of failing the request.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::models::{MappedPage, VehicleImages, VehicleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageSlot {
    Principal,
    Hover,
    Extra,
}

#[derive(Debug, Clone, Copy)]
enum ImageSource {
    /// A single image (string or object) stored under a key. For the extra
    /// slot an array under the key is accepted as well.
    Field(&'static str),
    /// One element of an image array.
    ListItem(&'static str, usize),
    /// Every element of an image array.
    ListAll(&'static str),
}

struct ImageRule {
    slot: ImageSlot,
    source: ImageSource,
}

const fn rule(slot: ImageSlot, source: ImageSource) -> ImageRule {
    ImageRule { slot, source }
}

// Evaluated top to bottom; the first hit wins for principal and hover.
const IMAGE_RULES: &[ImageRule] = &[
    rule(ImageSlot::Principal, ImageSource::Field("fotoPrincipal")),
    rule(ImageSlot::Principal, ImageSource::Field("imagenPrincipal")),
    rule(ImageSlot::Principal, ImageSource::Field("imagen")),
    rule(ImageSlot::Principal, ImageSource::Field("image")),
    rule(ImageSlot::Principal, ImageSource::ListItem("imagenes", 0)),
    rule(ImageSlot::Principal, ImageSource::ListItem("fotos", 0)),
    rule(ImageSlot::Hover, ImageSource::Field("fotoHover")),
    rule(ImageSlot::Hover, ImageSource::Field("imagenHover")),
    rule(ImageSlot::Hover, ImageSource::ListItem("imagenes", 1)),
    rule(ImageSlot::Hover, ImageSource::ListItem("fotos", 1)),
    rule(ImageSlot::Extra, ImageSource::Field("fotosExtra")),
    rule(ImageSlot::Extra, ImageSource::ListAll("imagenes")),
    rule(ImageSlot::Extra, ImageSource::ListAll("fotos")),
];

/// Maps one backend page. `requested_cursor` is the page index that was
/// asked for; it drives the next-cursor correction.
pub fn map_page(raw: &Value, requested_cursor: Option<u32>) -> MappedPage {
    let Some(page) = raw.as_object() else {
        tracing::warn!(?requested_cursor, "Search page is not a JSON object, treating as empty");
        return MappedPage::empty();
    };
    let Some(documents) = page.get("documents").or_else(|| page.get("docs")).and_then(Value::as_array) else {
        tracing::warn!(?requested_cursor, "Search page has no documents array, treating as empty");
        return MappedPage::empty();
    };

    let mut seen = HashSet::new();
    let mut vehicles = Vec::with_capacity(documents.len());
    for document in documents {
        match map_vehicle(document) {
            Some(vehicle) => {
                if seen.insert(vehicle.id.clone()) {
                    vehicles.push(vehicle);
                } else {
                    tracing::debug!(id = %vehicle.id, "Duplicate vehicle inside one page, keeping the first");
                }
            }
            None => tracing::warn!("Dropping vehicle document without a usable id"),
        }
    }

    let has_next_page = page.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false);
    let backend_cursor = page
        .get("nextPageCursor")
        .or_else(|| page.get("nextPage"))
        .and_then(as_u64)
        .and_then(|c| u32::try_from(c).ok());

    MappedPage {
        vehicles,
        total_docs: page.get("totalDocs").and_then(as_u64),
        has_next_page,
        next_page_cursor: correct_cursor(has_next_page, backend_cursor, requested_cursor),
    }
}

/// The backend has been seen returning a next cursor that does not
/// advance; following it would refetch the same page forever.
pub fn correct_cursor(has_next_page: bool, backend_cursor: Option<u32>, requested_cursor: Option<u32>) -> Option<u32> {
    if !has_next_page {
        return None;
    }
    match (requested_cursor, backend_cursor) {
        (Some(requested), Some(next)) if next > requested => Some(next),
        (Some(requested), _) => {
            tracing::debug!(requested, ?backend_cursor, "Backend cursor did not advance, correcting");
            Some(requested.saturating_add(1))
        }
        (None, backend) => backend,
    }
}

pub fn map_vehicle(document: &Value) -> Option<VehicleRecord> {
    let fields = document.as_object()?;
    let id = ["_id", "id"].iter().find_map(|key| fields.get(*key).and_then(as_id))?;

    Some(VehicleRecord {
        id,
        brand: first_text(fields, &["marca", "brand"]),
        model: first_text(fields, &["modelo", "model"]),
        version: first_text(fields, &["version", "versión"]),
        price: first_number(fields, &["precio", "price"]),
        year: first_number(fields, &["anio", "año", "year"]).map(|y| y as i64),
        mileage: first_number(fields, &["km", "kilometros", "kilometraje", "mileage"]),
        transmission: first_text(fields, &["caja", "transmision", "transmission"]),
        images: map_images(fields),
    })
}

fn map_images(fields: &Map<String, Value>) -> VehicleImages {
    let principal = first_image(fields, ImageSlot::Principal);
    let hover = first_image(fields, ImageSlot::Hover).filter(|hover| Some(hover) != principal.as_ref());

    let mut extra: Vec<String> = Vec::new();
    for image_rule in IMAGE_RULES.iter().filter(|r| r.slot == ImageSlot::Extra) {
        for url in resolve_all(fields, image_rule.source) {
            if Some(&url) != principal.as_ref() && Some(&url) != hover.as_ref() && !extra.contains(&url) {
                extra.push(url);
            }
        }
    }

    VehicleImages { principal, hover, extra }
}

fn first_image(fields: &Map<String, Value>, slot: ImageSlot) -> Option<String> {
    IMAGE_RULES
        .iter()
        .filter(|r| r.slot == slot)
        .find_map(|r| resolve_all(fields, r.source).into_iter().next())
}

fn resolve_all(fields: &Map<String, Value>, source: ImageSource) -> Vec<String> {
    match source {
        ImageSource::Field(key) => match fields.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(image_url).collect(),
            Some(value) => image_url(value).into_iter().collect(),
            None => Vec::new(),
        },
        ImageSource::ListItem(key, index) => fields
            .get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.get(index))
            .and_then(image_url)
            .into_iter()
            .collect(),
        ImageSource::ListAll(key) => fields
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(image_url).collect())
            .unwrap_or_default(),
    }
}

// Accepted shapes: "https://..." | {"url": "..."} | {"secure_url": "..."}
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Object(obj) => ["url", "secure_url"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str).and_then(non_blank)),
        _ => None,
    }
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        // Mongo extended JSON
        Value::Object(obj) => obj.get("$oid").and_then(Value::as_str).and_then(non_blank),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| fields.get(*key).and_then(Value::as_str).and_then(non_blank))
}

fn first_number(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
