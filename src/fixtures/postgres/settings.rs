use crate::error::Result;
use std::fmt;
use tokio_postgres::{Client, NoTls};

/// How to reach a Postgres server.
///
/// Plain data: derive a variant with [`ConnectionSettings::with_database`]
/// rather than mutating a shared value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub disable_ssl: bool,
}

impl ConnectionSettings {
    /// libpq key/value connection string.
    pub fn to_conn_string(&self) -> String {
        let sslmode = if self.disable_ssl { "disable" } else { "require" };
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            quote(&self.host),
            quote(&self.port),
            quote(&self.user),
            quote(&self.password),
            quote(&self.database),
            sslmode
        )
    }

    /// Copy pointing at another database on the same server.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        ConnectionSettings {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Open a connection and verify it answers a trivial query.
    ///
    /// The connection task is spawned on the current runtime and ends when
    /// the returned client is dropped.
    pub async fn connect(&self) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(&self.to_conn_string(), NoTls).await?;
        let database = self.database.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("Connection to database '{}' closed: {}", database, e);
            }
        });
        client.simple_query("SELECT 1").await?;
        Ok(client)
    }
}

// Values are single-quoted when empty or containing spaces, quotes or
// backslashes.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("disable_ssl", &self.disable_ssl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "localhost".into(),
            port: "49153".into(),
            user: "postgres".into(),
            password: "s3cr3t".into(),
            database: "fixtures".into(),
            disable_ssl: true,
        }
    }

    #[test]
    fn conn_string_format() {
        assert_eq!(
            settings().to_conn_string(),
            "host=localhost port=49153 user=postgres password=s3cr3t dbname=fixtures sslmode=disable"
        );
        let secure = ConnectionSettings {
            disable_ssl: false,
            ..settings()
        };
        assert!(secure.to_conn_string().ends_with("sslmode=require"));
    }

    #[test]
    fn conn_string_is_parseable() {
        let awkward = ConnectionSettings {
            password: "it's a secret".into(),
            ..settings()
        };
        let config: tokio_postgres::Config = awkward.to_conn_string().parse().unwrap();
        assert_eq!(config.get_password(), Some("it's a secret".as_bytes()));
        assert_eq!(config.get_dbname(), Some("fixtures"));
    }

    #[test]
    fn with_database_does_not_touch_the_original() {
        let original = settings();
        let derived = original.with_database("copy");
        assert_eq!(derived.database, "copy");
        assert_eq!(original.database, "fixtures");
        assert_eq!(derived.host, original.host);
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("s3cr3t"));
    }
}
