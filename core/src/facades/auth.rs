//! Login, registration, third-party exchange and logout.
//!
//! These are the only calls that write a credential into the token store.

use tracing::{info, warn};

use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::types::{AuthResponse, LoginRequest, OAuthExchange, RegisterRequest, User};

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let descriptor = RequestDescriptor::post("/api/v1/auth/login")
            .without_auth()
            .json(&body)?;
        self.establish(descriptor).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ClientError> {
        let descriptor = RequestDescriptor::post("/api/v1/auth/register")
            .without_auth()
            .json(request)?;
        self.establish(descriptor).await
    }

    /// Trade a third-party authorization code (e.g. `google`) for a session.
    pub async fn exchange_oauth(
        &self,
        provider: &str,
        exchange: &OAuthExchange,
    ) -> Result<User, ClientError> {
        let descriptor = RequestDescriptor::post(format!("/api/v1/auth/oauth/{provider}"))
            .without_auth()
            .json(exchange)?;
        self.establish(descriptor).await
    }

    /// The user behind the stored token.
    pub async fn me(&self) -> Result<User, ClientError> {
        self.client.request(RequestDescriptor::get("/api/v1/auth/me")).await
    }

    /// End the server session. The local credential is cleared whatever the
    /// server answers; a server failure is still returned.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .client
            .request::<serde_json::Value>(RequestDescriptor::post("/api/v1/auth/logout"))
            .await;
        self.client.tokens().clear();
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "server logout failed; local session cleared anyway");
                Err(e)
            }
        }
    }

    async fn establish(&self, descriptor: RequestDescriptor) -> Result<User, ClientError> {
        let AuthResponse { user, token } = self.client.request(descriptor).await?;
        self.client
            .tokens()
            .set(&token, &user)
            .map_err(ClientError::storage)?;
        info!(user_id = %user.id, "session established");
        Ok(user)
    }
}
