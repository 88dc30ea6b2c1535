//! Basic-auth credentials stored in Kubernetes Secrets
//!
//! Both the admin credentials of a ClusterConnection and the password of a
//! Role come from Secrets of type `kubernetes.io/basic-auth`.

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crd::SecretRef;

/// Required `type` of referenced Secrets
pub const SECRET_TYPE_BASIC_AUTH: &str = "kubernetes.io/basic-auth";

const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("SecretRef not found [secret.namespace={namespace}, secret.name={name}]")]
    NotFound { namespace: String, name: String },

    #[error(
        "The SecretRef is of the wrong type [secret.namespace={namespace}, secret.name={name}, expected.secret.type=kubernetes.io/basic-auth, actual.secret.type={actual}]"
    )]
    WrongType {
        namespace: String,
        name: String,
        actual: String,
    },

    #[error("The SecretRef has no data set [secret.namespace={namespace}, secret.name={name}]")]
    NoData { namespace: String, name: String },

    #[error(
        "The SecretRef is missing required data password [secret.namespace={namespace}, secret.name={name}]"
    )]
    MissingPassword { namespace: String, name: String },

    #[error("The SecretRef contains invalid UTF-8 in {key} [secret.namespace={namespace}, secret.name={name}]")]
    InvalidUtf8 {
        namespace: String,
        name: String,
        key: &'static str,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Username and password read from a basic-auth Secret
#[derive(Clone)]
pub struct BasicAuthCredentials {
    pub username: Option<String>,
    pub password: String,
}

impl fmt::Debug for BasicAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthCredentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

impl Drop for BasicAuthCredentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl BasicAuthCredentials {
    /// Extract credentials from an already fetched Secret
    pub fn from_secret(secret: &Secret) -> Result<Self, SecretError> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();

        let actual = secret.type_.clone().unwrap_or_default();
        if actual != SECRET_TYPE_BASIC_AUTH {
            return Err(SecretError::WrongType {
                namespace,
                name,
                actual,
            });
        }

        let data = match secret.data.as_ref() {
            Some(data) if !data.is_empty() => data,
            _ => return Err(SecretError::NoData { namespace, name }),
        };

        let decode = |key: &'static str| -> Result<Option<String>, SecretError> {
            data.get(key)
                .map(|value| {
                    String::from_utf8(value.0.clone()).map_err(|_| SecretError::InvalidUtf8 {
                        namespace: namespace.clone(),
                        name: name.clone(),
                        key,
                    })
                })
                .transpose()
        };

        let username = decode(USERNAME_KEY)?;
        let Some(password) = decode(PASSWORD_KEY)? else {
            return Err(SecretError::MissingPassword { namespace, name });
        };

        Ok(Self { username, password })
    }
}

/// Fetch the Secret behind `secret_ref` and extract its credentials
///
/// `default_namespace` is used when the reference carries no namespace.
pub async fn fetch_basic_auth(
    client: &Client,
    secret_ref: &SecretRef,
    default_namespace: &str,
) -> Result<BasicAuthCredentials, SecretError> {
    let namespace = secret_ref.namespace_or(default_namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let secret = secrets
        .get_opt(&secret_ref.name)
        .await?
        .ok_or_else(|| SecretError::NotFound {
            namespace: namespace.to_string(),
            name: secret_ref.name.clone(),
        })?;

    BasicAuthCredentials::from_secret(&secret)
}
