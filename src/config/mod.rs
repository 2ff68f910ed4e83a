//! Configuration layer: typed settings with layered precedence (files → environment).

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::compilation::DEFAULT_VIEW_START_FILE_NAME;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mvcore";
const ENV_PREFIX: &str = "MVCORE";
const DEFAULT_BINDING_MAX_DEPTH: usize = 32;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub binding: BindingSettings,
    pub validation: ValidationSettings,
    pub compilation: CompilationSettings,
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
pub struct BindingSettings {
    pub max_depth: NonZeroUsize,
    pub fallback_to_empty_prefix: bool,
}

/// Types pruned from validation, by resolved type or by exact full name.
#[derive(Debug, Clone, Default)]
pub struct ValidationSettings {
    pub exclude_types: Vec<String>,
    pub exclude_type_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompilationSettings {
    pub view_start_file_name: String,
    pub precompiled_manifest: Option<PathBuf>,
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

/// Load settings using the configured precedence: `config/default`, then
/// `mvcore`, then `config_file`, then `MVCORE__*` environment variables.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("validation.exclude_types")
            .with_list_parse_key("validation.exclude_type_names")
            .try_parsing(true),
    );

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            binding,
            validation,
            compilation,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let binding = build_binding_settings(binding)?;
        let validation = build_validation_settings(validation)?;
        let compilation = build_compilation_settings(compilation)?;

        Ok(Self {
            logging,
            binding,
            validation,
            compilation,
        })
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

fn build_binding_settings(binding: RawBindingSettings) -> Result<BindingSettings, LoadError> {
    let max_depth = binding.max_depth.unwrap_or(DEFAULT_BINDING_MAX_DEPTH);
    let max_depth = NonZeroUsize::new(max_depth)
        .ok_or_else(|| LoadError::invalid("binding.max_depth", "must be greater than zero"))?;

    Ok(BindingSettings {
        max_depth,
        fallback_to_empty_prefix: binding.fallback_to_empty_prefix.unwrap_or(true),
    })
}

fn build_validation_settings(
    validation: RawValidationSettings,
) -> Result<ValidationSettings, LoadError> {
    let exclude_types = type_names(validation.exclude_types, "validation.exclude_types")?;
    let exclude_type_names =
        type_names(validation.exclude_type_names, "validation.exclude_type_names")?;

    Ok(ValidationSettings {
        exclude_types,
        exclude_type_names,
    })
}

fn build_compilation_settings(
    compilation: RawCompilationSettings,
) -> Result<CompilationSettings, LoadError> {
    let view_start_file_name = match compilation.view_start_file_name {
        Some(name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
                return Err(LoadError::invalid(
                    "compilation.view_start_file_name",
                    "must be a bare file name",
                ));
            }
            trimmed.to_string()
        }
        None => DEFAULT_VIEW_START_FILE_NAME.to_string(),
    };

    let precompiled_manifest = compilation
        .precompiled_manifest
        .filter(|path| !path.as_os_str().is_empty());

    Ok(CompilationSettings {
        view_start_file_name,
        precompiled_manifest,
    })
}

/// Trimmed, non-empty type names. Names are compared ordinally later, so
/// no case folding happens here.
fn type_names(names: Vec<String>, key: &'static str) -> Result<Vec<String>, LoadError> {
    names
        .into_iter()
        .map(|name| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                Err(LoadError::invalid(key, "type names must not be empty"))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    binding: RawBindingSettings,
    validation: RawValidationSettings,
    compilation: RawCompilationSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBindingSettings {
    max_depth: Option<usize>,
    fallback_to_empty_prefix: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawValidationSettings {
    exclude_types: Vec<String>,
    exclude_type_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCompilationSettings {
    view_start_file_name: Option<String>,
    precompiled_manifest: Option<PathBuf>,
}
