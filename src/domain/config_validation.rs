//! Configuration validation.
//!
//! Reads every setting through [`ConfigPort`], checks it and returns a typed
//! [`Settings`]. Missing keys fall back to defaults; present but invalid
//! values are errors.

use crate::domain::engine::{EngineConfig, DEFAULT_MARKET_SEPARATOR};
use crate::domain::error::TickwatchError;
use crate::domain::fields::{FieldTable, PRIMARY_TICKER_KEY};
use crate::domain::history::DEFAULT_MAX_POINTS;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    pub notify: bool,
    pub sound: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Snapshot destination; stdout when unset.
    pub path: Option<String>,
    /// Where to export the history window after a run, if anywhere.
    pub history_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub history_max_points: usize,
    pub alerts: AlertSettings,
    pub output: OutputSettings,
}

pub fn load_settings(config: &dyn ConfigPort) -> Result<Settings, TickwatchError> {
    Ok(Settings {
        engine: EngineConfig {
            ticker_key: validate_ticker_key(config)?,
            market_separator: validate_market_separator(config)?,
            fields: load_field_table(config)?,
        },
        history_max_points: validate_max_points(config)?,
        alerts: AlertSettings {
            notify: config.get_bool("alerts", "notify", true),
            sound: config.get_bool("alerts", "sound", true),
        },
        output: validate_output(config)?,
    })
}

fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn validate_ticker_key(config: &dyn ConfigPort) -> Result<String, TickwatchError> {
    match non_blank(config, "feed", "ticker_key") {
        None => Ok(PRIMARY_TICKER_KEY.to_string()),
        Some(key) if key.chars().any(char::is_whitespace) => Err(TickwatchError::ConfigInvalid {
            section: "feed".to_string(),
            key: "ticker_key".to_string(),
            reason: "ticker_key must not contain whitespace".to_string(),
        }),
        Some(key) => Ok(key),
    }
}

fn validate_market_separator(config: &dyn ConfigPort) -> Result<char, TickwatchError> {
    let Some(value) = non_blank(config, "engine", "market_separator") else {
        return Ok(DEFAULT_MARKET_SEPARATOR);
    };
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(TickwatchError::ConfigInvalid {
            section: "engine".to_string(),
            key: "market_separator".to_string(),
            reason: "market_separator must be a single character".to_string(),
        }),
    }
}

fn validate_max_points(config: &dyn ConfigPort) -> Result<usize, TickwatchError> {
    let value = config.get_int("history", "max_points", DEFAULT_MAX_POINTS as i64);
    if value < 1 {
        return Err(TickwatchError::ConfigInvalid {
            section: "history".to_string(),
            key: "max_points".to_string(),
            reason: "max_points must be at least 1".to_string(),
        });
    }
    usize::try_from(value).map_err(|_| TickwatchError::ConfigInvalid {
        section: "history".to_string(),
        key: "max_points".to_string(),
        reason: "max_points is too large".to_string(),
    })
}

fn validate_output(config: &dyn ConfigPort) -> Result<OutputSettings, TickwatchError> {
    let format = match non_blank(config, "output", "format") {
        None => OutputFormat::default(),
        Some(f) => match f.to_lowercase().as_str() {
            "json" | "jsonl" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            other => {
                return Err(TickwatchError::ConfigInvalid {
                    section: "output".to_string(),
                    key: "format".to_string(),
                    reason: format!("unknown format '{}', expected json or csv", other),
                })
            }
        },
    };
    Ok(OutputSettings {
        format,
        path: non_blank(config, "output", "path"),
        history_path: non_blank(config, "output", "history_path"),
    })
}

/// Built-in field names with `[fields]` overrides applied.
fn load_field_table(config: &dyn ConfigPort) -> Result<FieldTable, TickwatchError> {
    let mut table = FieldTable::default();
    for (raw_key, display) in config.section_entries("fields") {
        let display = display.trim();
        if display.is_empty() || display.contains([']', '[', '{', '}']) {
            return Err(TickwatchError::ConfigInvalid {
                section: "fields".to_string(),
                key: raw_key,
                reason: "display name must be non-empty and free of brackets".to_string(),
            });
        }
        table.insert(&raw_key, display);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let settings = load_settings(&FileConfigAdapter::empty()).unwrap();
        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.history_max_points, 300);
        assert_eq!(
            settings.alerts,
            AlertSettings {
                notify: true,
                sound: true
            }
        );
        assert_eq!(settings.output, OutputSettings::default());
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[feed]
ticker_key = symbol

[engine]
market_separator = :

[history]
max_points = 50

[alerts]
sound = false

[output]
format = csv
path = out.csv
history_path = history.csv

[fields]
a3 = last
a99 = sector
"#,
        );
        let settings = load_settings(&config).unwrap();
        assert_eq!(settings.engine.ticker_key, "symbol");
        assert_eq!(settings.engine.market_separator, ':');
        assert_eq!(settings.engine.fields.display_name("a3"), "last");
        assert_eq!(settings.engine.fields.display_name("a99"), "sector");
        assert_eq!(settings.engine.fields.display_name("a1"), "code");
        assert_eq!(settings.history_max_points, 50);
        assert!(settings.alerts.notify);
        assert!(!settings.alerts.sound);
        assert_eq!(settings.output.format, OutputFormat::Csv);
        assert_eq!(settings.output.path.as_deref(), Some("out.csv"));
        assert_eq!(settings.output.history_path.as_deref(), Some("history.csv"));
    }

    #[test]
    fn ticker_key_with_space_fails() {
        let err = load_settings(&make_config("[feed]\nticker_key = a 1\n")).unwrap_err();
        assert!(matches!(err, TickwatchError::ConfigInvalid { key, .. } if key == "ticker_key"));
    }

    #[test]
    fn long_separator_fails() {
        let err = load_settings(&make_config("[engine]\nmarket_separator = ::\n")).unwrap_err();
        assert!(
            matches!(err, TickwatchError::ConfigInvalid { key, .. } if key == "market_separator")
        );
    }

    #[test]
    fn max_points_zero_fails() {
        let err = load_settings(&make_config("[history]\nmax_points = 0\n")).unwrap_err();
        assert!(matches!(err, TickwatchError::ConfigInvalid { key, .. } if key == "max_points"));
    }

    #[test]
    fn unknown_output_format_fails() {
        let err = load_settings(&make_config("[output]\nformat = xml\n")).unwrap_err();
        assert!(matches!(err, TickwatchError::ConfigInvalid { key, .. } if key == "format"));
    }

    #[test]
    fn bracketed_field_name_fails() {
        let err = load_settings(&make_config("[fields]\na3 = pri]ce\n")).unwrap_err();
        assert!(matches!(err, TickwatchError::ConfigInvalid { key, .. } if key == "a3"));
    }
}
