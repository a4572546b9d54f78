
use url::Url;

use crate::config::ConfigError;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

/// How positional bind parameters are spelled in query text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter
    Question,
    /// `$1`, `$2`, ...
    Numbered,
}

impl Dialect {
    /// Dialect name as shown to clients
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
        }
    }

    #[inline]
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Numbered,
            Self::Sqlite | Self::MySql => PlaceholderStyle::Question,
        }
    }

    /// Resolve a URL scheme, ignoring any `+driver` suffix
    #[inline]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let base = scheme.split('+').next().unwrap_or(scheme);
        match base.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    fn sqlx_scheme(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }
}

/// Identity of the connected database, as parsed from its URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub database: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
}

/// A validated database URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    pub dialect: Dialect,
    /// URL in the form sqlx expects
    pub sqlx_url: String,
    pub info: ConnectionInfo,
}

impl DatabaseUrl {
    /// Parse a connection URL. SQLAlchemy spellings such as
    /// `postgresql+psycopg2://...` and `sqlite:///relative.db` are accepted.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let (scheme, rest) = raw
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidUrl(raw.to_string()))?;
        let dialect = Dialect::from_scheme(scheme)
            .ok_or_else(|| ConfigError::UnsupportedScheme(scheme.to_string()))?;

        match dialect {
            Dialect::Sqlite => Ok(Self::parse_sqlite(rest)),
            Dialect::Postgres | Dialect::MySql => Self::parse_server(dialect, raw, rest),
        }
    }

    fn parse_sqlite(rest: &str) -> Self {
        // sqlite:///relative.db and sqlite:////abs.db follow SQLAlchemy;
        // sqlite://file.db and sqlite:file.db follow sqlx
        let path = rest
            .strip_prefix("///")
            .or_else(|| rest.strip_prefix("//"))
            .unwrap_or(rest);
        let path = if path.is_empty() { ":memory:" } else { path };

        let database = path.split('?').next().unwrap_or(path).to_string();

        Self {
            dialect: Dialect::Sqlite,
            sqlx_url: format!("sqlite://{}", path),
            info: ConnectionInfo {
                database: Some(database),
                host: None,
                username: None,
            },
        }
    }

    fn parse_server(dialect: Dialect, raw: &str, rest: &str) -> Result<Self, ConfigError> {
        let sqlx_url = format!("{}:{}", dialect.sqlx_scheme(), rest);
        let parsed = Url::parse(&sqlx_url).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;

        let database = parsed.path().trim_start_matches('/');
        let username = parsed.username();

        Ok(Self {
            dialect,
            info: ConnectionInfo {
                database: (!database.is_empty()).then(|| database.to_string()),
                host: parsed.host_str().map(str::to_string),
                username: (!username.is_empty()).then(|| username.to_string()),
            },
            sqlx_url,
        })
    }
}

/// Replace the password of a URL with `***`. Unparseable input is returned
/// unchanged.
#[inline]
pub fn redact_password(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_ok() {
                url.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
