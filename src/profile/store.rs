use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::cooldown::can_change_display_name;
use super::{
    LoginEntry, LoginInfo, NameChange, NewUser, ProfileApi, ProfileError, ProfileUpdate, User,
};
use crate::cache::Clock;

const DEFAULT_DISPLAY_NAME: &str = "User";

/// Server-side user records. The cooldown is enforced here as well as in the
/// client so a stale client cannot bypass it.
pub struct InMemoryProfileStore {
    users: Mutex<HashMap<String, User>>,
    clock: Arc<dyn Clock>,
    cooldown_days: i64,
}

impl InMemoryProfileStore {
    pub fn new(clock: Arc<dyn Clock>, cooldown_days: i64) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            clock,
            cooldown_days,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }
}

#[async_trait]
impl ProfileApi for InMemoryProfileStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, ProfileError> {
        if new_user.uid.trim().is_empty() {
            return Err(ProfileError::Invalid("uid is required".to_string()));
        }
        if new_user.email.trim().is_empty() {
            return Err(ProfileError::Invalid("email is required".to_string()));
        }
        let now = self.clock.now();
        let entry = LoginEntry {
            timestamp: now,
            ip_address: new_user.ip_address.clone(),
            device_info: new_user.device_info.clone(),
        };

        let mut users = self.users.lock().await;
        if let Some(existing) = users.get_mut(&new_user.uid) {
            // Returning user: record the login, keep the chosen display name.
            existing.last_login = now;
            existing.device_info = Some(new_user.device_info);
            existing.ip_address = Some(new_user.ip_address);
            existing.login_history.push(entry);
            if new_user.photo_url.is_some() {
                existing.photo_url = new_user.photo_url;
            }
            return Ok(existing.clone());
        }

        let display_name = new_user
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        let user = User {
            uid: new_user.uid.clone(),
            email: new_user.email,
            display_name,
            photo_url: new_user.photo_url,
            created_at: now,
            last_login: now,
            display_name_history: Vec::new(),
            last_display_name_change: None,
            device_info: Some(new_user.device_info),
            ip_address: Some(new_user.ip_address),
            login_history: vec![entry],
        };
        info!(uid = %user.uid, "Created user");
        users.insert(new_user.uid, user.clone());
        Ok(user)
    }

    async fn get_user(&self, uid: &str) -> Result<User, ProfileError> {
        self.users
            .lock()
            .await
            .get(uid)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(uid.to_string()))
    }

    async fn update_user(&self, uid: &str, update: ProfileUpdate) -> Result<User, ProfileError> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(uid)
            .ok_or_else(|| ProfileError::NotFound(uid.to_string()))?;
        if let Some(photo_url) = update.photo_url {
            user.photo_url = Some(photo_url);
        }
        Ok(user.clone())
    }

    async fn update_login_info(&self, uid: &str, login: LoginInfo) -> Result<User, ProfileError> {
        let now = self.clock.now();
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(uid)
            .ok_or_else(|| ProfileError::NotFound(uid.to_string()))?;
        user.last_login = now;
        user.device_info = Some(login.device_info.clone());
        user.ip_address = Some(login.ip_address.clone());
        user.login_history.push(LoginEntry {
            timestamp: now,
            ip_address: login.ip_address,
            device_info: login.device_info,
        });
        Ok(user.clone())
    }

    async fn change_display_name(
        &self,
        uid: &str,
        display_name: &str,
    ) -> Result<User, ProfileError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let now = self.clock.now();
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(uid)
            .ok_or_else(|| ProfileError::NotFound(uid.to_string()))?;
        if user.display_name == name {
            return Err(ProfileError::SameName);
        }
        let status = can_change_display_name(user.last_display_name_change, now, self.cooldown_days);
        if !status.can_change {
            return Err(ProfileError::Cooldown {
                days_remaining: status.days_remaining,
            });
        }

        let previous = std::mem::replace(&mut user.display_name, name.to_string());
        user.display_name_history.push(NameChange {
            previous_name: previous,
            changed_at: now,
        });
        user.last_display_name_change = Some(now);
        info!(uid, "Display name changed");
        Ok(user.clone())
    }
}
