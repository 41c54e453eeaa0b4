use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument, warn};

use super::wire::{PasswordGrant, RefreshGrant, TokenResponse};
use super::{IdentityService, SessionCheck};
use crate::config::SessionConfig;
use crate::error::IdentityError;
use crate::model::{Credentials, Session, SignIn, TokenPair, User};

/// Identity service adapter for a GoTrue-style REST API.
///
/// Holds its own notion of the current session in memory, the way a
/// provider SDK does; `get_session` reports on that session after
/// checking it against `/auth/v1/user`.
pub struct HttpIdentityService {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    current: Mutex<Option<Session>>,
}

impl HttpIdentityService {
    pub fn new(config: &SessionConfig) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(config.identity_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.identity_url.clone(),
            api_key: config.identity_api_key.clone(),
            current: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn with_headers(&self, req: RequestBuilder, access_token: Option<&str>) -> RequestBuilder {
        let req = match &self.api_key {
            Some(key) => req.header("apikey", key),
            None => req,
        };
        match access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn current(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, IdentityError> {
        let req = self.with_headers(self.http.get(self.url("user")), Some(access_token));
        let resp = check_status(req.send().await?)?;
        Ok(resp.json().await?)
    }

    async fn token_grant<T: serde::Serialize + ?Sized>(
        &self,
        grant_type: &str,
        body: &T,
    ) -> Result<SignIn, IdentityError> {
        let url = format!("{}?grant_type={}", self.url("token"), grant_type);
        let req = self.with_headers(self.http.post(url), None).json(body);

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::InvalidCredentials);
        }

        let resp = check_status(resp)?;
        let body: TokenResponse = resp.json().await?;
        Ok(body.into_sign_in(Utc::now()))
    }

    /// Exchange the refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<Session, IdentityError> {
        let sign_in = self
            .token_grant("refresh_token", &RefreshGrant { refresh_token })
            .await
            .map_err(|e| match e {
                IdentityError::InvalidCredentials => IdentityError::Unauthorized,
                other => other,
            })?;

        *self.current.lock() = Some(sign_in.session.clone());
        Ok(sign_in.session)
    }
}

#[async_trait::async_trait]
impl IdentityService for HttpIdentityService {
    #[instrument(skip(self), level = "debug")]
    async fn get_session(&self) -> SessionCheck {
        let Some(mut session) = self.current() else {
            return SessionCheck::Absent;
        };

        match self.fetch_user(&session.access_token).await {
            Ok(user) => {
                session.user_id = Some(user.id);
                SessionCheck::Active(session)
            }
            Err(e) if e.is_unauthorized() => {
                let Some(refresh_token) = session.refresh_token.clone() else {
                    self.current.lock().take();
                    return SessionCheck::Unauthorized;
                };

                debug!("access token rejected; attempting refresh");
                match self.refresh(&refresh_token).await {
                    Ok(fresh) => SessionCheck::Active(fresh),
                    Err(e) if e.is_unauthorized() => {
                        self.current.lock().take();
                        SessionCheck::Unauthorized
                    }
                    Err(e) => SessionCheck::Transient(e),
                }
            }
            Err(e) => SessionCheck::Transient(e),
        }
    }

    async fn set_session(&self, tokens: &TokenPair) -> Result<(), IdentityError> {
        if tokens.access_token.is_empty() {
            return Err(IdentityError::InvalidResponse("empty access token".into()));
        }

        let mut session = Session::new(tokens.access_token.clone());
        if !tokens.refresh_token.is_empty() {
            session.refresh_token = Some(tokens.refresh_token.clone());
        }
        *self.current.lock() = Some(session);

        Ok(())
    }

    #[instrument(skip_all, fields(identifier = %credentials.identifier))]
    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<SignIn, IdentityError> {
        let grant = PasswordGrant {
            email: &credentials.identifier,
            password: &credentials.secret,
        };
        let sign_in = self.token_grant("password", &grant).await?;

        *self.current.lock() = Some(sign_in.session.clone());
        Ok(sign_in)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let Some(session) = self.current.lock().take() else {
            return Ok(());
        };

        let req = self.with_headers(
            self.http.post(self.url("logout")),
            Some(&session.access_token),
        );
        match check_status(req.send().await?) {
            Ok(_) => Ok(()),
            // already gone on the server side
            Err(IdentityError::Unauthorized) => Ok(()),
            Err(e) => {
                warn!(error = %e, "remote sign-out failed");
                Err(e)
            }
        }
    }

    async fn get_user(&self) -> Result<Option<User>, IdentityError> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        self.fetch_user(&session.access_token).await.map(Some)
    }
}

fn check_status(resp: Response) -> Result<Response, IdentityError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(status_error(status))
}

fn status_error(status: StatusCode) -> IdentityError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IdentityError::Unauthorized,
        other => IdentityError::UnexpectedStatus(other.as_u16()),
    }
}
