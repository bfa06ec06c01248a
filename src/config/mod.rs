//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::format_options::{FormatDefaults, KmScore};
use crate::application::service::MapServiceConfig;

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, RenderArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kmlmap";
const ENV_PREFIX: &str = "KMLMAP";
const DEFAULT_BASE_URL: &str = "http://localhost:8080/geoserver/";
const DEFAULT_OVERLAY_FORMAT: &str = "image/png";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub service: ServiceSettings,
    pub catalog: CatalogSettings,
    pub kml: KmlSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Always ends with `/`.
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct KmlSettings {
    pub default_kmscore: KmScore,
    pub default_kmattr: bool,
    pub max_features: Option<NonZeroU64>,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub format: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            service,
            catalog,
            kml,
            overlay,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let service = build_service_settings(service)?;
        let catalog = build_catalog_settings(catalog);
        let kml = build_kml_settings(kml)?;
        let overlay = build_overlay_settings(overlay)?;

        Ok(Self {
            logging,
            service,
            catalog,
            kml,
            overlay,
        })
    }

    /// Rendering configuration handed to the map service.
    pub fn map_service_config(&self) -> MapServiceConfig {
        MapServiceConfig {
            base_url: self.service.base_url.to_string(),
            overlay_format: self.overlay.format.clone(),
            defaults: FormatDefaults {
                score: self.kml.default_kmscore,
                include_attributes: self.kml.default_kmattr,
            },
            max_features: self.kml.max_features.map(NonZeroU64::get),
        }
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_service_settings(service: RawServiceSettings) -> Result<ServiceSettings, LoadError> {
    let raw = service
        .base_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let normalized = format!("{}/", raw.trim_end_matches('/'));
    let base_url = Url::parse(&normalized)
        .map_err(|err| LoadError::invalid("service.base_url", format!("`{raw}`: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "service.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }
    Ok(ServiceSettings { base_url })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> CatalogSettings {
    CatalogSettings {
        path: catalog
            .path
            .filter(|path| !path.as_os_str().is_empty()),
    }
}

fn build_kml_settings(kml: RawKmlSettings) -> Result<KmlSettings, LoadError> {
    let default_kmscore = match kml.default_kmscore {
        Some(value) => u8::try_from(value)
            .ok()
            .and_then(KmScore::new)
            .ok_or_else(|| {
                LoadError::invalid("kml.default_kmscore", "must be between 0 and 100")
            })?,
        None => KmScore::DEFAULT,
    };
    let max_features = kml
        .max_features
        .map(|value| non_zero_u64(value, "kml.max_features"))
        .transpose()?;

    Ok(KmlSettings {
        default_kmscore,
        default_kmattr: kml.default_kmattr.unwrap_or(true),
        max_features,
    })
}

fn build_overlay_settings(overlay: RawOverlaySettings) -> Result<OverlaySettings, LoadError> {
    let format = overlay
        .format
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_OVERLAY_FORMAT.to_string());
    if !format.starts_with("image/") {
        return Err(LoadError::invalid(
            "overlay.format",
            format!("`{format}` is not an image MIME type"),
        ));
    }
    let timeout_seconds = non_zero_u32(
        overlay
            .timeout_seconds
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        "overlay.timeout_seconds",
    )?;

    Ok(OverlaySettings {
        format,
        timeout: Duration::from_secs(u64::from(timeout_seconds.get())),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    service: RawServiceSettings,
    catalog: RawCatalogSettings,
    kml: RawKmlSettings,
    overlay: RawOverlaySettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(path) = overrides.catalog.as_ref() {
            self.catalog.path = Some(path.clone());
        }
        if let Some(url) = overrides.base_url.as_ref() {
            self.service.base_url = Some(url.clone());
        }
        if let Some(max) = overrides.max_features {
            self.kml.max_features = Some(max);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServiceSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKmlSettings {
    default_kmscore: Option<u64>,
    default_kmattr: Option<bool>,
    max_features: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOverlaySettings {
    format: Option<String>,
    timeout_seconds: Option<u64>,
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
