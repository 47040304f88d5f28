//! Weather adapter: current conditions and daily forecasts via Open-Meteo.

use super::ToolOutput;
use crate::config::WeatherSettings;
use crate::error::{CourseMateError, Result as CourseMateResult, ToolError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Words that stand for "wherever I am" and cannot be geocoded.
const PLACEHOLDER_LOCATIONS: &[&str] = &[
    "current location",
    "my location",
    "here",
    "now",
    "today",
    "local",
    "location",
];

/// Open-Meteo serves at most this many forecast days.
const PROVIDER_MAX_FORECAST_DAYS: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeatherInput {
    /// Empty when the caller gave no location.
    #[serde(default)]
    pub location: String,
    /// Forecast date; current conditions when absent.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl WeatherInput {
    pub fn current(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            date: None,
        }
    }

    pub fn on(location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            location: location.into(),
            date: Some(date),
        }
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        let location = self.location.trim();
        if location.chars().count() < 2 {
            return Err(ToolError::InvalidInput(format!(
                "\"{}\" is not a usable location",
                self.location
            )));
        }
        if PLACEHOLDER_LOCATIONS.contains(&location.to_lowercase().as_str()) {
            return Err(ToolError::InvalidInput(format!(
                "\"{}\" is not a city name",
                self.location
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location: String,
    pub temperature_c: f64,
    pub wind_kmh: f64,
    pub conditions: String,
    pub observed_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub location: String,
    pub date: NaiveDate,
    pub temperature_min_c: Option<f64>,
    pub temperature_max_c: Option<f64>,
    /// Highest precipitation probability of the day, in percent.
    pub precipitation_probability: Option<f64>,
    pub wind_max_kmh: Option<f64>,
    pub conditions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeatherReport {
    Current(CurrentWeather),
    Daily(DailyForecast),
}

impl WeatherReport {
    pub fn location(&self) -> &str {
        match self {
            WeatherReport::Current(c) => &c.location,
            WeatherReport::Daily(d) => &d.location,
        }
    }

    pub fn render(&self) -> String {
        match self {
            WeatherReport::Current(c) => format!(
                "Current weather in {}: {}, {:.1}°C, wind {:.0} km/h (observed {})",
                c.location, c.conditions, c.temperature_c, c.wind_kmh, c.observed_at
            ),
            WeatherReport::Daily(d) => {
                let mut parts = vec![d.conditions.clone()];
                if let (Some(min), Some(max)) = (d.temperature_min_c, d.temperature_max_c) {
                    parts.push(format!("{:.0}°C to {:.0}°C", min, max));
                }
                if let Some(p) = d.precipitation_probability {
                    parts.push(format!("precipitation probability up to {:.0}%", p));
                }
                if let Some(w) = d.wind_max_kmh {
                    parts.push(format!("wind up to {:.0} km/h", w));
                }
                let mut line = format!("Forecast for {} on {}: {}", d.location, d.date, parts.join(", "));
                if d.precipitation_probability.is_some_and(|p| p >= 50.0) {
                    line.push_str(". Take an umbrella.");
                }
                line
            }
        }
    }
}

/// What a provider found for one lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherLookup {
    Found(WeatherReport),
    UnknownLocation,
    /// The provider has no forecast for the date; it covers `from..=to`.
    OutOfRange { from: NaiveDate, to: NaiveDate },
}

/// Source of weather data.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn lookup(&self, input: &WeatherInput) -> Result<WeatherLookup, ToolError>;
}

/// Run a weather call, applying the forecast horizon before any network access.
pub async fn invoke(
    provider: &dyn WeatherProvider,
    input: &WeatherInput,
    today: NaiveDate,
    horizon_days: i64,
) -> Result<ToolOutput, ToolError> {
    if let Some(date) = input.date {
        let last = today + ChronoDuration::days(horizon_days);
        if date < today || date > last {
            return Ok(ToolOutput::not_found(format!(
                "No forecast for {}: forecasts are available from {} to {}",
                date, today, last
            )));
        }
    }

    match provider.lookup(input).await? {
        WeatherLookup::Found(report) => Ok(ToolOutput::Weather { report }),
        WeatherLookup::UnknownLocation => Ok(ToolOutput::not_found(format!(
            "Location not found: {}",
            input.location
        ))),
        WeatherLookup::OutOfRange { from, to } => Ok(ToolOutput::not_found(format!(
            "No forecast for {}: forecasts are available from {} to {}",
            input.date.map(|d| d.to_string()).unwrap_or_default(),
            from,
            to
        ))),
    }
}

/// Describe a WMO weather interpretation code.
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 | 77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown conditions",
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Option<Vec<GeoPlace>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeoPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

impl GeoPlace {
    fn label(&self) -> String {
        match &self.country {
            Some(country) => format!("{}, {}", self.name, country),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current_weather: Option<CurrentBlock>,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature: f64,
    windspeed: f64,
    weathercode: u32,
    time: String,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<NaiveDate>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<u32>>,
}

/// Open-Meteo geocoding plus forecast client.
pub struct OpenMeteo {
    client: reqwest::Client,
    geocode_url: String,
    forecast_url: String,
    forecast_days: i64,
}

impl OpenMeteo {
    pub fn from_settings(settings: &WeatherSettings, timeout: Duration) -> CourseMateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourseMateError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            geocode_url: settings.geocode_url.clone(),
            forecast_url: settings.forecast_url.clone(),
            forecast_days: PROVIDER_MAX_FORECAST_DAYS,
        })
    }

    /// Limit how many days are requested per forecast.
    pub fn with_forecast_days(mut self, days: i64) -> Self {
        self.forecast_days = days.clamp(1, PROVIDER_MAX_FORECAST_DAYS);
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ToolError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream(format!(
                "{} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response.json::<T>().await?)
    }

    /// Resolve "City" or "City, Country" to the best matching place.
    #[instrument(skip(self))]
    async fn geocode(&self, location: &str) -> Result<Option<GeoPlace>, ToolError> {
        let mut parts = location.splitn(2, ',');
        let name = parts.next().unwrap_or(location).trim();
        let country_hint = parts.next().map(|c| c.trim().to_lowercase());

        let response: GeocodeResponse = self
            .get_json(
                &self.geocode_url,
                &[
                    ("name", name.to_string()),
                    ("count", "5".to_string()),
                    ("language", "en".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let places = response.results.unwrap_or_default();
        let preferred = country_hint.and_then(|hint| {
            places
                .iter()
                .find(|p| {
                    p.country
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&hint))
                })
                .cloned()
        });

        Ok(preferred.or_else(|| places.into_iter().next()))
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteo {
    async fn lookup(&self, input: &WeatherInput) -> Result<WeatherLookup, ToolError> {
        let Some(place) = self.geocode(&input.location).await? else {
            return Ok(WeatherLookup::UnknownLocation);
        };
        debug!("Geocoded {} to {} ({}, {})", input.location, place.label(), place.latitude, place.longitude);

        let coords = [
            ("latitude", place.latitude.to_string()),
            ("longitude", place.longitude.to_string()),
            ("timezone", "auto".to_string()),
        ];

        let Some(date) = input.date else {
            let mut query = coords.to_vec();
            query.push(("current_weather", "true".to_string()));
            let response: ForecastResponse = self.get_json(&self.forecast_url, &query).await?;
            let current = response
                .current_weather
                .ok_or_else(|| ToolError::Upstream("response has no current_weather".to_string()))?;

            return Ok(WeatherLookup::Found(WeatherReport::Current(CurrentWeather {
                location: place.label(),
                temperature_c: current.temperature,
                wind_kmh: current.windspeed,
                conditions: describe_weather_code(current.weathercode).to_string(),
                observed_at: current.time,
            })));
        };

        let mut query = coords.to_vec();
        query.push((
            "daily",
            "temperature_2m_max,temperature_2m_min,precipitation_probability_max,wind_speed_10m_max,weather_code"
                .to_string(),
        ));
        query.push(("forecast_days", self.forecast_days.to_string()));

        let response: ForecastResponse = self.get_json(&self.forecast_url, &query).await?;
        let daily = response
            .daily
            .ok_or_else(|| ToolError::Upstream("response has no daily block".to_string()))?;

        let Some(idx) = daily.time.iter().position(|d| *d == date) else {
            return match (daily.time.first(), daily.time.last()) {
                (Some(from), Some(to)) => Ok(WeatherLookup::OutOfRange { from: *from, to: *to }),
                _ => Err(ToolError::Upstream("daily block is empty".to_string())),
            };
        };

        let at = |values: &[Option<f64>]| values.get(idx).copied().flatten();
        let code = daily.weather_code.get(idx).copied().flatten();

        Ok(WeatherLookup::Found(WeatherReport::Daily(DailyForecast {
            location: place.label(),
            date,
            temperature_min_c: at(&daily.temperature_2m_min),
            temperature_max_c: at(&daily.temperature_2m_max),
            precipitation_probability: at(&daily.precipitation_probability_max),
            wind_max_kmh: at(&daily.wind_speed_10m_max),
            conditions: code
                .map(describe_weather_code)
                .unwrap_or("Unknown conditions")
                .to_string(),
        })))
    }
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "location": {
                "type": "string",
                "description": "City name, optionally with country (e.g. \"Haifa, Israel\"); the configured default location when omitted"
            },
            "date": {
                "type": "string",
                "format": "date",
                "description": "Forecast date (YYYY-MM-DD); omit for current conditions"
            }
        }
    })
}

pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "kind": {"enum": ["current", "daily"]},
            "location": {"type": "string"},
            "date": {"type": "string", "format": "date"},
            "temperature_c": {"type": "number"},
            "temperature_min_c": {"type": ["number", "null"]},
            "temperature_max_c": {"type": ["number", "null"]},
            "precipitation_probability": {"type": ["number", "null"]},
            "wind_kmh": {"type": "number"},
            "wind_max_kmh": {"type": ["number", "null"]},
            "conditions": {"type": "string"}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{date, ScriptedWeather};

    fn rainy(on: NaiveDate) -> WeatherLookup {
        WeatherLookup::Found(WeatherReport::Daily(DailyForecast {
            location: "Haifa, Israel".into(),
            date: on,
            temperature_min_c: Some(11.0),
            temperature_max_c: Some(17.0),
            precipitation_probability: Some(80.0),
            wind_max_kmh: Some(30.0),
            conditions: "Rain".into(),
        }))
    }

    #[test]
    fn test_placeholder_locations_rejected() {
        for bad in ["here", "My Location", "x", "  "] {
            assert!(WeatherInput::current(bad).validate().is_err(), "{}", bad);
        }
        assert!(WeatherInput::current("Tel Aviv").validate().is_ok());
    }

    #[test]
    fn test_weather_codes() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(63), "Rain");
        assert_eq!(describe_weather_code(81), "Rain showers");
        assert_eq!(describe_weather_code(42), "Unknown conditions");
    }

    #[test]
    fn test_daily_render_mentions_umbrella_when_wet() {
        let WeatherLookup::Found(report) = rainy(date("2026-02-10")) else {
            unreachable!()
        };
        let text = report.render();
        assert!(text.contains("precipitation probability up to 80%"));
        assert!(text.contains("umbrella"));
    }

    #[tokio::test]
    async fn test_beyond_horizon_skips_provider() {
        let provider = ScriptedWeather::new(vec![Ok(rainy(date("2026-03-30")))]);
        let output = invoke(
            &provider,
            &WeatherInput::on("Haifa", date("2026-03-30")),
            date("2026-02-01"),
            15,
        )
        .await
        .unwrap();

        assert!(output.is_absence());
        assert!(output.render().contains("2026-02-16"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_past_date_is_absent() {
        let provider = ScriptedWeather::new(vec![]);
        let output = invoke(
            &provider,
            &WeatherInput::on("Haifa", date("2026-01-20")),
            date("2026-02-01"),
            15,
        )
        .await
        .unwrap();
        assert!(output.is_absence());
    }

    #[tokio::test]
    async fn test_unknown_location_is_absent() {
        let provider = ScriptedWeather::new(vec![Ok(WeatherLookup::UnknownLocation)]);
        let output = invoke(&provider, &WeatherInput::current("Atlantis"), date("2026-02-01"), 15)
            .await
            .unwrap();
        assert_eq!(
            output,
            ToolOutput::not_found("Location not found: Atlantis")
        );
    }

    #[tokio::test]
    async fn test_forecast_within_horizon() {
        let provider = ScriptedWeather::new(vec![Ok(rainy(date("2026-02-10")))]);
        let output = invoke(
            &provider,
            &WeatherInput::on("Haifa, Israel", date("2026-02-10")),
            date("2026-02-01"),
            15,
        )
        .await
        .unwrap();
        assert!(matches!(output, ToolOutput::Weather { .. }));
    }

    #[test]
    fn test_parse_daily_block() {
        let body = r#"{
            "daily": {
                "time": ["2026-02-01", "2026-02-02"],
                "temperature_2m_max": [18.2, null],
                "temperature_2m_min": [10.1, 9.0],
                "precipitation_probability_max": [10, 85],
                "wind_speed_10m_max": [20.5, 33.0],
                "weather_code": [1, 63]
            }
        }"#;
        let parsed: ForecastResponse = serde_json::from_str(body).unwrap();
        let daily = parsed.daily.unwrap();
        assert_eq!(daily.time[1], date("2026-02-02"));
        assert_eq!(daily.temperature_2m_max[1], None);
        assert_eq!(daily.weather_code[1], Some(63));
    }
}
