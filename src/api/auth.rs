//! Purpose: Resolve OAuth bearer tokens for the Sheets API.
//! Exports: `TokenSource`, `StaticToken`, `ServiceAccountTokens`, `CredentialSources`, `load_token_source`, `SCOPES`.
//! Role: Credential lookup order: pre-minted token, key JSON from the environment, key file on disk.
//! Invariants: Token values and private keys are never logged.
//! Invariants: An unparsable environment key falls back to the key file instead of failing the run.
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::core::error::{Error, ErrorKind};

type ApiResult<T> = Result<T, Error>;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

pub const ACCESS_TOKEN_ENV: &str = "SHEETS_ACCESS_TOKEN";
pub const CREDENTIALS_ENV: &str = "GOOGLE_CREDENTIALS";

pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> ApiResult<String>;
}

/// A bearer token minted elsewhere (e.g. `gcloud auth print-access-token`).
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> ApiResult<String> {
        Ok(self.0.clone())
    }
}

/// Service-account tokens minted and cached by `yup-oauth2`.
///
/// The authenticator is async; it runs on a private current-thread runtime so
/// the rest of the crate stays blocking.
pub struct ServiceAccountTokens {
    client_email: String,
    fetch: Box<dyn Fn() -> ApiResult<String> + Send + Sync>,
}

impl ServiceAccountTokens {
    pub fn from_key_json(json: &str, scopes: &[&str]) -> ApiResult<Self> {
        let key = yup_oauth2::parse_service_account_key(json).map_err(|err| {
            Error::new(ErrorKind::Auth)
                .with_message("invalid service account key")
                .with_source(err)
        })?;
        let client_email = key.client_email.clone();

        install_crypto_provider();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to start auth runtime")
                    .with_source(err)
            })?;
        let auth = runtime
            .block_on(yup_oauth2::ServiceAccountAuthenticator::builder(key).build())
            .map_err(|err| {
                Error::new(ErrorKind::Auth)
                    .with_message("failed to build service account authenticator")
                    .with_source(err)
            })?;

        let scopes: Vec<String> = scopes.iter().map(|scope| scope.to_string()).collect();
        let fetch = move || -> ApiResult<String> {
            let token = runtime.block_on(auth.token(&scopes)).map_err(|err| {
                Error::new(token_error_kind(&err))
                    .with_message("failed to obtain access token")
                    .with_source(err)
            })?;
            token
                .token()
                .map(str::to_string)
                .ok_or_else(|| Error::new(ErrorKind::Auth).with_message("token response had no access token"))
        };

        Ok(Self {
            client_email,
            fetch: Box::new(fetch),
        })
    }

    pub fn from_key_file(path: &Path, scopes: &[&str]) -> ApiResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Auth)
                .with_message(format!("failed to read key file {}", path.display()))
                .with_source(err)
        })?;
        Self::from_key_json(&json, scopes)
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }
}

impl TokenSource for ServiceAccountTokens {
    fn access_token(&self) -> ApiResult<String> {
        (self.fetch)()
    }
}

/// Where credentials may come from; captured once so lookup stays testable.
#[derive(Clone, Debug, Default)]
pub struct CredentialSources {
    pub access_token: Option<String>,
    pub key_json: Option<String>,
    pub key_file: PathBuf,
}

impl CredentialSources {
    pub fn from_env(key_file: impl Into<PathBuf>) -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            access_token: non_empty(ACCESS_TOKEN_ENV),
            key_json: non_empty(CREDENTIALS_ENV),
            key_file: key_file.into(),
        }
    }
}

pub fn load_token_source(
    sources: &CredentialSources,
    scopes: &[&str],
) -> ApiResult<Box<dyn TokenSource>> {
    if let Some(token) = &sources.access_token {
        info!("using bearer token from {ACCESS_TOKEN_ENV}");
        return Ok(Box::new(StaticToken::new(token.trim())));
    }

    if let Some(json) = &sources.key_json {
        match ServiceAccountTokens::from_key_json(json, scopes) {
            Ok(tokens) => {
                info!(
                    "credentials loaded from {CREDENTIALS_ENV} ({})",
                    tokens.client_email()
                );
                return Ok(Box::new(tokens));
            }
            Err(err) => {
                error!(
                    "failed to use {CREDENTIALS_ENV}, trying {}: {err}",
                    sources.key_file.display()
                );
            }
        }
    } else {
        info!(
            "{CREDENTIALS_ENV} not set, using {}",
            sources.key_file.display()
        );
    }

    if !sources.key_file.exists() {
        return Err(Error::new(ErrorKind::Auth)
            .with_message(format!(
                "no credentials found ({} does not exist)",
                sources.key_file.display()
            ))
            .with_hint(format!(
                "Set {CREDENTIALS_ENV} to a service account key, {ACCESS_TOKEN_ENV} to a bearer token, or pass --credentials."
            )));
    }
    let tokens = ServiceAccountTokens::from_key_file(&sources.key_file, scopes)?;
    info!(
        "credentials loaded from {} ({})",
        sources.key_file.display(),
        tokens.client_email()
    );
    Ok(Box::new(tokens))
}

/// Transport failures at the token endpoint are retryable; everything else is a credential problem.
fn token_error_kind(err: &yup_oauth2::Error) -> ErrorKind {
    match err {
        yup_oauth2::Error::HttpError(_)
        | yup_oauth2::Error::HttpClientError(_)
        | yup_oauth2::Error::LowLevelError(_) => ErrorKind::Io,
        _ => ErrorKind::Auth,
    }
}

fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
