//! PostgreSQL sessions opened from a ClusterConnection
//!
//! A [`PostgresSession`] is opened per reconciliation with the admin
//! credentials of the referenced ClusterConnection and dropped when the
//! reconciliation ends. Opening a session also reads the server major version,
//! which the privilege planners need for version gating.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::{Client, ResourceExt};
use rustls::pki_types::{CertificateDer, ServerName};
use thiserror::Error;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Config, GenericClient, NoTls, Transaction};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::crd::{ClusterConnection, ClusterConnectionSpec};
use crate::resources::catalog::major_version;
use crate::resources::secret::{SecretError, fetch_basic_auth};
use crate::resources::sql::Statement;

/// Username used when the admin Secret carries none
pub const DEFAULT_ADMIN_USER: &str = "postgres";

const DEFAULT_APPLICATION_NAME: &str = "pg-object-operator";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur during PostgreSQL operations
#[derive(Error, Debug)]
pub enum PostgresClientError {
    #[error("{}", describe_postgres_error(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("Invalid connection parameter {key}: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Unexpected server version: {0}")]
    ServerVersion(String),
}

/// Result type for PostgreSQL client operations
pub type PostgresClientResult<T> = Result<T, PostgresClientError>;

/// Server-reported message for database errors, the full chain otherwise
pub fn describe_postgres_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db_error) => match db_error.detail() {
            Some(detail) => format!("{} ({})", db_error.message(), detail),
            None => db_error.message().to_string(),
        },
        None => error.to_string(),
    }
}

/// TLS mode for PostgreSQL connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain TCP (`sslmode=disable`)
    Disabled,
    /// TLS without certificate verification (`prefer`, `require`)
    Unverified,
    /// TLS verified against the CA bundle at `root_cert` (`verify-ca`, `verify-full`)
    Verified { root_cert: PathBuf },
}

/// Connection settings derived from a ClusterConnection spec
#[derive(Debug)]
pub struct ConnectionSettings {
    pub config: Config,
    pub tls: TlsMode,
}

impl ConnectionSettings {
    /// Build the client configuration; `database` overrides the maintenance database
    pub fn from_spec(
        spec: &ClusterConnectionSpec,
        database: Option<&str>,
        user: &str,
        password: &str,
    ) -> PostgresClientResult<Self> {
        let mut config = Config::new();
        config
            .host(&spec.host)
            .port(spec.port)
            .dbname(database.unwrap_or(&spec.database))
            .user(user)
            .password(password)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .application_name(DEFAULT_APPLICATION_NAME);

        let mut ssl_mode = "prefer";
        let mut root_cert = None;

        for (key, value) in &spec.parameters {
            match key.as_str() {
                "sslmode" => ssl_mode = value.as_str(),
                "sslrootcert" => root_cert = Some(PathBuf::from(value)),
                "application_name" => {
                    config.application_name(value);
                }
                "options" => {
                    config.options(value);
                }
                "connect_timeout" => {
                    config.connect_timeout(Duration::from_secs(parse_seconds(key, value)?));
                }
                "keepalives" => {
                    config.keepalives(value != "0");
                }
                "keepalives_idle" => {
                    config.keepalives_idle(Duration::from_secs(parse_seconds(key, value)?));
                }
                _ => warn!(parameter = %key, "Ignoring unsupported connection parameter"),
            }
        }

        let tls = match ssl_mode {
            "disable" => TlsMode::Disabled,
            "prefer" | "require" => TlsMode::Unverified,
            "verify-ca" | "verify-full" => match root_cert {
                Some(root_cert) => TlsMode::Verified { root_cert },
                None => {
                    return Err(PostgresClientError::InvalidParameter {
                        key: "sslrootcert".into(),
                        reason: format!("required when sslmode is {ssl_mode}"),
                    });
                }
            },
            other => {
                return Err(PostgresClientError::InvalidParameter {
                    key: "sslmode".into(),
                    reason: format!("unsupported value {other}"),
                });
            }
        };

        config.ssl_mode(match ssl_mode {
            "disable" => SslMode::Disable,
            "prefer" => SslMode::Prefer,
            _ => SslMode::Require,
        });

        Ok(Self { config, tls })
    }
}

fn parse_seconds(key: &str, value: &str) -> PostgresClientResult<u64> {
    value
        .parse()
        .map_err(|_| PostgresClientError::InvalidParameter {
            key: key.to_string(),
            reason: format!("expected whole seconds, got {value}"),
        })
}

/// An open connection plus the server major version
pub struct PostgresSession {
    client: tokio_postgres::Client,
    server_version: u32,
}

impl PostgresSession {
    /// Connect to the server behind `connection` as its admin user
    ///
    /// `database` selects the database to connect to; `None` uses the
    /// connection's maintenance database.
    pub async fn connect(
        kube_client: &Client,
        connection: &ClusterConnection,
        database: Option<&str>,
    ) -> PostgresClientResult<Self> {
        let namespace = connection.namespace().unwrap_or_default();
        let credentials =
            fetch_basic_auth(kube_client, &connection.spec.admin_secret_ref, &namespace).await?;
        let user = credentials.username.as_deref().unwrap_or(DEFAULT_ADMIN_USER);

        let settings =
            ConnectionSettings::from_spec(&connection.spec, database, user, &credentials.password)?;

        let client = match &settings.tls {
            TlsMode::Disabled => {
                let (client, conn) = settings.config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::trace!(error = %e, "PostgreSQL connection closed");
                    }
                });
                client
            }
            tls_mode => {
                let tls = build_tls_connector(tls_mode).await?;
                let (client, conn) = settings.config.connect(tls).await?;
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::trace!(error = %e, "PostgreSQL TLS connection closed");
                    }
                });
                client
            }
        };

        let row = client
            .query_one("select current_setting('server_version_num')", &[])
            .await?;
        let version_num: String = row.get(0);
        let server_version = major_version(&version_num)
            .ok_or_else(|| PostgresClientError::ServerVersion(version_num.clone()))?;

        debug!(
            connection = %connection.name_any(),
            database = database.unwrap_or(&connection.spec.database),
            server_version,
            "PostgreSQL session opened"
        );

        Ok(Self {
            client,
            server_version,
        })
    }

    /// Server major version, e.g. 17
    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    pub async fn transaction(&mut self) -> PostgresClientResult<Transaction<'_>> {
        Ok(self.client.transaction().await?)
    }

    /// Full `version()` string
    pub async fn version_string(&self) -> PostgresClientResult<String> {
        let row = self.client.query_one("select version()", &[]).await?;
        Ok(row.get(0))
    }
}

/// Run statements in order, stopping at the first failure
pub async fn apply_statements<C>(client: &C, statements: &[Statement]) -> PostgresClientResult<()>
where
    C: GenericClient + Sync,
{
    for statement in statements {
        debug!(statement = %statement, "Executing statement");
        client.batch_execute(statement.sql()).await?;
    }
    Ok(())
}

// =============================================================================
// TLS Configuration
// =============================================================================

/// Parse PEM-encoded certificates into DER format
fn parse_pem_certificates(pem_data: &str) -> PostgresClientResult<Vec<CertificateDer<'static>>> {
    let mut certs = Vec::new();
    let mut reader = std::io::BufReader::new(pem_data.as_bytes());

    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(cert) => certs.push(cert),
            Err(e) => {
                return Err(PostgresClientError::InvalidCertificate(format!(
                    "Failed to parse certificate: {}",
                    e
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(PostgresClientError::InvalidCertificate(
            "No certificates found in PEM data".to_string(),
        ));
    }

    Ok(certs)
}

/// Build a rustls TLS connector for PostgreSQL
async fn build_tls_connector(tls_mode: &TlsMode) -> PostgresClientResult<MakeRustlsConnect> {
    match tls_mode {
        TlsMode::Disabled => Err(PostgresClientError::TlsConfig(
            "Cannot build TLS connector for disabled TLS mode".to_string(),
        )),
        TlsMode::Unverified => {
            let config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
        TlsMode::Verified { root_cert } => {
            let pem = tokio::fs::read_to_string(root_cert).await.map_err(|e| {
                PostgresClientError::TlsConfig(format!(
                    "Failed to read sslrootcert {}: {}",
                    root_cert.display(),
                    e
                ))
            })?;

            let mut root_store = rustls::RootCertStore::empty();
            for cert in parse_pem_certificates(&pem)? {
                root_store.add(cert).map_err(|e| {
                    PostgresClientError::InvalidCertificate(format!("Failed to add CA cert: {}", e))
                })?;
            }

            let config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            Ok(MakeRustlsConnect::new(config))
        }
    }
}

/// Accepts any server certificate; used for `sslmode=prefer` and `require`
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
