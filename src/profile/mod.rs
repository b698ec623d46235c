//! User profiles: records, the profile API seam, and its two implementations
//! (the HTTP client used by the UI and the in-memory store behind the server).

mod client;
mod cooldown;
mod device;
mod service;
mod store;

pub use client::HttpProfileClient;
pub use cooldown::{can_change_display_name, NameChangeStatus, DEFAULT_COOLDOWN_DAYS};
pub use device::{
    detect_browser, detect_device, detect_os, DeviceCollector, IpLookup, PublicIpLookup,
    StaticIpLookup, UNKNOWN_IP,
};
pub use service::ProfileService;
pub use store::InMemoryProfileStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEntry {
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameChange {
    pub previous_name: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    #[serde(default)]
    pub display_name_history: Vec<NameChange>,
    #[serde(default)]
    pub last_display_name_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub login_history: Vec<LoginEntry>,
}

/// Payload for creating (or re-registering) a user after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    pub device_info: DeviceInfo,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub device_info: DeviceInfo,
    pub ip_address: String,
}

/// Free-form profile edits. The display name is deliberately absent: it only
/// changes through the cooldown-checked path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNameChange {
    pub display_name: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("User {0} not found")]
    NotFound(String),
    #[error("Display name cannot be empty")]
    EmptyName,
    #[error("New display name must be different from current name")]
    SameName,
    #[error("You can change your display name in {days_remaining} days")]
    Cooldown { days_remaining: i64 },
    #[error("Invalid profile data: {0}")]
    Invalid(String),
    #[error("Profile service unreachable: {0}")]
    Transport(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Identity provider rejected the change: {0}")]
    Identity(String),
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, ProfileError>;
    async fn get_user(&self, uid: &str) -> Result<User, ProfileError>;
    async fn update_user(&self, uid: &str, update: ProfileUpdate) -> Result<User, ProfileError>;
    async fn update_login_info(&self, uid: &str, login: LoginInfo) -> Result<User, ProfileError>;
    async fn change_display_name(&self, uid: &str, display_name: &str)
        -> Result<User, ProfileError>;
}
