//! Connection string parsing.
//!
//! A connection string is either a bare SQLite path (`school.db`) or a list
//! of `Keyword=Value` pairs separated by `;`:
//!
//! ```text
//! Data Source=school.db;Mode=ReadWriteCreate;Max Pool Size=16;Default Timeout=5
//! ```
//!
//! Keywords are case-insensitive and internal whitespace is ignored, so
//! `Data Source`, `DataSource` and `data source` are the same keyword.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Open read-write, creating the file if missing.
    #[default]
    ReadWriteCreate,
    /// Open read-write; the file must already exist.
    ReadWrite,
    /// Open read-only.
    ReadOnly,
    /// Private in-memory database per connection.
    Memory,
}

impl FromStr for OpenMode {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_keyword(s).as_str() {
            "readwritecreate" => Ok(Self::ReadWriteCreate),
            "readwrite" => Ok(Self::ReadWrite),
            "readonly" => Ok(Self::ReadOnly),
            "memory" => Ok(Self::Memory),
            _ => Err(ConnectionStringError::InvalidValue {
                keyword: "Mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Parsed form of a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Path of the SQLite database file.
    pub data_source: String,
    pub mode: OpenMode,
    /// Overrides the configured pool size when present.
    pub max_pool_size: Option<u32>,
    /// Busy timeout in milliseconds, from `Default Timeout` (seconds).
    pub busy_timeout_ms: Option<u64>,
    pub foreign_keys: bool,
}

impl ConnectionSettings {
    /// Settings for a bare file path with every option at its default.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            data_source: path.into(),
            mode: OpenMode::default(),
            max_pool_size: None,
            busy_timeout_ms: None,
            foreign_keys: true,
        }
    }
}

/// Errors produced while parsing a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("connection string segment '{0}' is not a Keyword=Value pair")]
    MalformedSegment(String),

    #[error("unsupported connection string keyword '{0}'")]
    UnknownKeyword(String),

    #[error("invalid value '{value}' for connection string keyword '{keyword}'")]
    InvalidValue { keyword: String, value: String },

    #[error("connection string has no Data Source")]
    MissingDataSource,
}

fn normalize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    for quote in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(quote) && v.ends_with(quote) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

fn parse_bool(keyword: &str, value: &str) -> Result<bool, ConnectionStringError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConnectionStringError::InvalidValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(keyword: &str, value: &str) -> Result<T, ConnectionStringError> {
    value
        .parse()
        .map_err(|_| ConnectionStringError::InvalidValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
        })
}

impl FromStr for ConnectionSettings {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        if !raw.contains('=') {
            return Ok(Self::for_path(unquote(raw)));
        }

        let mut settings = Self::for_path(String::new());
        let mut data_source = None;

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (keyword, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
            let keyword = keyword.trim();
            let value = unquote(value);

            match normalize_keyword(keyword).as_str() {
                "datasource" | "filename" => data_source = Some(value.to_string()),
                "mode" => settings.mode = value.parse()?,
                "maxpoolsize" => {
                    let size: u32 = parse_number(keyword, value)?;
                    if size == 0 {
                        return Err(ConnectionStringError::InvalidValue {
                            keyword: keyword.to_string(),
                            value: value.to_string(),
                        });
                    }
                    settings.max_pool_size = Some(size);
                }
                "defaulttimeout" | "commandtimeout" => {
                    let secs: u64 = parse_number(keyword, value)?;
                    settings.busy_timeout_ms = Some(secs.saturating_mul(1_000));
                }
                "foreignkeys" => settings.foreign_keys = parse_bool(keyword, value)?,
                _ => return Err(ConnectionStringError::UnknownKeyword(keyword.to_string())),
            }
        }

        settings.data_source = match (data_source, settings.mode) {
            (Some(path), _) if !path.is_empty() => path,
            (_, OpenMode::Memory) => ":memory:".to_string(),
            _ => return Err(ConnectionStringError::MissingDataSource),
        };

        Ok(settings)
    }
}

impl fmt::Display for ConnectionSettings {
    /// Renders a loggable summary. There are no secrets in a SQLite
    /// connection string, so the path is shown as-is.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data Source={};Mode={:?}", self.data_source, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_is_data_source() {
        let settings: ConnectionSettings = "school.db".parse().unwrap();
        assert_eq!(settings, ConnectionSettings::for_path("school.db"));
    }

    #[test]
    fn keyword_pairs_are_case_and_space_insensitive() {
        let settings: ConnectionSettings =
            "datasource='/var/lib/school.db'; MAX POOL SIZE=16;Default Timeout=3;Foreign Keys=false"
                .parse()
                .unwrap();
        assert_eq!(settings.data_source, "/var/lib/school.db");
        assert_eq!(settings.max_pool_size, Some(16));
        assert_eq!(settings.busy_timeout_ms, Some(3_000));
        assert!(!settings.foreign_keys);
        assert_eq!(settings.mode, OpenMode::ReadWriteCreate);
    }

    #[test]
    fn memory_mode_needs_no_data_source() {
        let settings: ConnectionSettings = "Mode=Memory".parse().unwrap();
        assert_eq!(settings.data_source, ":memory:");
        assert_eq!(settings.mode, OpenMode::Memory);
    }

    #[test]
    fn empty_and_whitespace_strings_are_rejected() {
        assert_eq!(
            "   ".parse::<ConnectionSettings>(),
            Err(ConnectionStringError::Empty)
        );
    }

    #[test]
    fn unknown_keyword_is_rejected() {
        assert_eq!(
            "Data Source=a.db;Server=localhost".parse::<ConnectionSettings>(),
            Err(ConnectionStringError::UnknownKeyword("Server".to_string()))
        );
    }

    #[test]
    fn missing_data_source_is_rejected() {
        assert_eq!(
            "Max Pool Size=4".parse::<ConnectionSettings>(),
            Err(ConnectionStringError::MissingDataSource)
        );
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert!(matches!(
            "Data Source=a.db;Max Pool Size=0".parse::<ConnectionSettings>(),
            Err(ConnectionStringError::InvalidValue { .. })
        ));
    }

    #[test]
    fn segment_without_equals_is_malformed() {
        assert_eq!(
            "Data Source=a.db;oops".parse::<ConnectionSettings>(),
            Err(ConnectionStringError::MalformedSegment("oops".to_string()))
        );
    }
}
