//! Signed-in session: wraps the identity provider, keeps the profile store in
//! step with sign-ins and broadcasts session changes to subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::notify::Notifier;
use crate::profile::{DeviceCollector, NewUser, ProfileApi, ProfileError, ProfileService, User};

pub const POPUP_CLOSED_CODE: &str = "auth/popup-closed-by-user";
pub const POPUP_BLOCKED_CODE: &str = "auth/popup-blocked";

/// What the identity provider knows about the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("sign-in popup closed by user")]
    PopupClosed,
    #[error("sign-in popup blocked")]
    PopupBlocked,
    #[error("No user is currently logged in")]
    NotSignedIn,
    #[error("identity provider error {code}: {message}")]
    Provider { code: String, message: String },
    #[error("could not save user profile: {0}")]
    Profile(String),
}

impl AuthError {
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            POPUP_CLOSED_CODE => AuthError::PopupClosed,
            POPUP_BLOCKED_CODE => AuthError::PopupBlocked,
            _ => AuthError::Provider {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    /// Text shown to the user when signing in fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::PopupClosed => "Sign in was cancelled. Please try again.",
            AuthError::PopupBlocked => {
                "Pop-up was blocked by your browser. Please allow pop-ups for this site."
            }
            _ => "Failed to sign in with Google",
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Account already signed in from a previous visit, if any.
    async fn current_user(&self) -> Option<Identity>;
    async fn sign_in_with_popup(&self) -> Result<Identity, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn update_display_name(&self, display_name: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<Identity>,
    /// True until the first restore completes and while a sign-in is in flight.
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileApi>,
    devices: Arc<DeviceCollector>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<SessionState>,
}

impl AuthSession {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileApi>,
        devices: Arc<DeviceCollector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            provider,
            profiles,
            devices,
            notifier,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().user.is_some()
    }

    fn set_user(&self, user: Option<Identity>) {
        self.state.send_modify(|s| s.user = user);
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }

    /// Picks up a session that survived from an earlier visit and records the
    /// login. A failed login update is logged and otherwise ignored.
    pub async fn restore(&self) {
        let user = self.provider.current_user().await;
        if let Some(identity) = &user {
            let login = self.devices.collect().await;
            if let Err(err) = self.profiles.update_login_info(&identity.uid, login).await {
                error!(uid = %identity.uid, "Error updating login information: {}", err);
            }
        }
        self.state.send_modify(|s| {
            s.user = user;
            s.loading = false;
        });
    }

    pub async fn sign_in_with_google(&self) -> Result<Identity, AuthError> {
        self.set_loading(true);
        let result = self.sign_in_and_save().await;
        self.set_loading(false);

        match &result {
            Ok(identity) => {
                info!(uid = %identity.uid, "Signed in");
                self.notifier.success("Successfully signed in!");
            }
            Err(err) => {
                error!("Error signing in with Google: {}", err);
                self.notifier.error(err.user_message());
            }
        }
        result
    }

    async fn sign_in_and_save(&self) -> Result<Identity, AuthError> {
        let identity = self.provider.sign_in_with_popup().await?;
        self.set_user(Some(identity.clone()));

        let login = self.devices.collect().await;
        let new_user = NewUser {
            uid: identity.uid.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: identity.display_name.clone(),
            photo_url: identity.photo_url.clone(),
            device_info: login.device_info,
            ip_address: login.ip_address,
        };
        self.profiles
            .create_user(new_user)
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        Ok(identity)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.set_user(None);
                self.notifier.success("Successfully signed out!");
                Ok(())
            }
            Err(err) => {
                error!("Error signing out: {}", err);
                self.notifier.error("Failed to sign out");
                Err(err)
            }
        }
    }

    /// Renames the account at the identity provider and mirrors it locally.
    pub async fn update_display_name(&self, display_name: &str) -> Result<(), AuthError> {
        if self.current_user().is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.provider.update_display_name(display_name).await?;
        let name = display_name.to_string();
        self.state.send_modify(|s| {
            if let Some(user) = s.user.as_mut() {
                user.display_name = Some(name);
            }
        });
        Ok(())
    }

    /// Full settings-page rename: profile store first, then the identity
    /// provider.
    pub async fn rename(
        &self,
        profiles: &ProfileService,
        user: &User,
        new_name: &str,
    ) -> Result<User, ProfileError> {
        let updated = profiles.change_display_name(user, new_name).await?;
        if let Err(err) = self.update_display_name(&updated.display_name).await {
            warn!(uid = %user.uid, "Identity provider rename failed: {}", err);
            self.notifier.error(&err.to_string());
            return Err(ProfileError::Identity(err.to_string()));
        }
        self.notifier.success("Display name updated successfully");
        Ok(updated)
    }
}
