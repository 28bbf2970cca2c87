// Layered configuration for the catalog engine and its HTTP surface.
// Uses the 'config' crate and 'dotenv', same as the rest of the app.

use anyhow::Result;
use chrono::Datelike;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::filter_codec::FilterDefaults;
use crate::models::RangeFilter;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_address: String,
    // Remote search endpoint (the inventory backend)
    pub search_api_url: String,
    pub page_limit: u32,
    pub fetch_timeout_secs: u64,

    // Default range pairs; a range equal to its default is treated as unset
    pub year_default_min: i64,
    pub year_default_max: i64,
    pub price_default_min: i64,
    pub price_default_max: i64,
    pub km_default_min: i64,
    pub km_default_max: i64,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let current_year = i64::from(chrono::Local::now().year());

        let builder = Config::builder()
            // Add default values
            .set_default("server_address", "127.0.0.1:3000")?
            .set_default("search_api_url", "http://127.0.0.1:4000/api/vehiculos/search")?
            .set_default("page_limit", 24)?
            .set_default("fetch_timeout_secs", 15)?
            .set_default("year_default_min", 1990)?
            .set_default("year_default_max", current_year)?
            .set_default("price_default_min", 0)?
            .set_default("price_default_max", 100_000_000)?
            .set_default("km_default_min", 0)?
            .set_default("km_default_max", 500_000)?
            // Load from a configuration file (e.g., config.toml)
            .add_source(File::with_name("config").required(false))
            // Load from environment variables (e.g., APP_SEARCH_API_URL).
            // Keys contain underscores, so a double underscore separates nesting.
            .add_source(Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Builds the codec defaults from configuration. Pairs with `min > max`
    /// are a configuration error.
    pub fn filter_defaults(&self) -> Result<FilterDefaults> {
        let pair = |name: &str, min: i64, max: i64| {
            RangeFilter::new(min, max)
                .ok_or_else(|| anyhow::anyhow!("Invalid default {} range: {} > {}", name, min, max))
        };
        Ok(FilterDefaults {
            anio: pair("year", self.year_default_min, self.year_default_max)?,
            precio: pair("price", self.price_default_min, self.price_default_max)?,
            km: pair("km", self.km_default_min, self.km_default_max)?,
        })
    }
}
