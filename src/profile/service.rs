use std::sync::Arc;

use tracing::{info, warn};

use super::cooldown::{can_change_display_name, NameChangeStatus};
use super::{ProfileApi, ProfileError, User};
use crate::cache::Clock;
use crate::notify::Notifier;

const UPDATE_FAILED: &str = "Failed to update display name";

/// Client-side profile operations. Checks that can be decided locally run
/// before any request leaves the process.
pub struct ProfileService {
    api: Arc<dyn ProfileApi>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cooldown_days: i64,
}

impl ProfileService {
    pub fn new(
        api: Arc<dyn ProfileApi>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        cooldown_days: i64,
    ) -> Self {
        Self {
            api,
            notifier,
            clock,
            cooldown_days,
        }
    }

    pub fn api(&self) -> &Arc<dyn ProfileApi> {
        &self.api
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn name_change_status(&self, user: &User) -> NameChangeStatus {
        can_change_display_name(
            user.last_display_name_change,
            self.clock.now(),
            self.cooldown_days,
        )
    }

    /// Returns the trimmed name when `user` may switch to it right now.
    pub fn validate_display_name(&self, user: &User, new_name: &str) -> Result<String, ProfileError> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if name == user.display_name {
            return Err(ProfileError::SameName);
        }
        let status = self.name_change_status(user);
        if !status.can_change {
            return Err(ProfileError::Cooldown {
                days_remaining: status.days_remaining,
            });
        }
        Ok(name.to_string())
    }

    /// Validates, then asks the profile API to apply the change. Failures are
    /// surfaced as error notifications as well as returned.
    pub async fn change_display_name(
        &self,
        user: &User,
        new_name: &str,
    ) -> Result<User, ProfileError> {
        let name = match self.validate_display_name(user, new_name) {
            Ok(name) => name,
            Err(err) => {
                self.notifier.error(&err.to_string());
                return Err(err);
            }
        };

        match self.api.change_display_name(&user.uid, &name).await {
            Ok(updated) => {
                info!(uid = %user.uid, "Display name updated");
                Ok(updated)
            }
            Err(err) => {
                warn!(uid = %user.uid, "Display name update failed: {}", err);
                self.notifier.error(&Self::failure_message(&err));
                Err(err)
            }
        }
    }

    fn failure_message(err: &ProfileError) -> String {
        match err {
            ProfileError::Server { message, .. } if !message.trim().is_empty() => message.clone(),
            ProfileError::Cooldown { .. } | ProfileError::EmptyName | ProfileError::SameName => {
                err.to_string()
            }
            _ => UPDATE_FAILED.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::notify::RecordingNotifier;
    use crate::profile::{
        DeviceInfo, InMemoryProfileStore, LoginInfo, NewUser, ProfileUpdate,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DAY: u64 = 24 * 60 * 60;

    /// Store wrapper that counts every call reaching the API.
    pub(crate) struct CountingProfiles {
        pub inner: InMemoryProfileStore,
        pub calls: AtomicUsize,
    }

    impl CountingProfiles {
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                inner: InMemoryProfileStore::new(clock, 60),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProfileApi for CountingProfiles {
        async fn create_user(&self, user: NewUser) -> Result<User, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create_user(user).await
        }
        async fn get_user(&self, uid: &str) -> Result<User, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_user(uid).await
        }
        async fn update_user(
            &self,
            uid: &str,
            update: ProfileUpdate,
        ) -> Result<User, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.update_user(uid, update).await
        }
        async fn update_login_info(
            &self,
            uid: &str,
            login: LoginInfo,
        ) -> Result<User, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.update_login_info(uid, login).await
        }
        async fn change_display_name(
            &self,
            uid: &str,
            display_name: &str,
        ) -> Result<User, ProfileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.change_display_name(uid, display_name).await
        }
    }

    pub(crate) fn new_user(uid: &str, name: &str) -> NewUser {
        NewUser {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: Some(name.to_string()),
            photo_url: None,
            device_info: DeviceInfo::default(),
            ip_address: "198.51.100.1".to_string(),
        }
    }

    struct Fixture {
        clock: ManualClock,
        api: Arc<CountingProfiles>,
        notifier: Arc<RecordingNotifier>,
        service: ProfileService,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap());
        let api = Arc::new(CountingProfiles::new(Arc::new(clock.clone())));
        let notifier = Arc::new(RecordingNotifier::new());
        let service = ProfileService::new(
            api.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
            60,
        );
        Fixture {
            clock,
            api,
            notifier,
            service,
        }
    }

    #[tokio::test]
    async fn cooldown_is_rejected_before_any_request() {
        let fx = fixture();
        fx.api.create_user(new_user("u1", "Ada")).await.expect("create");
        let user = fx.api.change_display_name("u1", "Ada L").await.expect("rename");
        fx.clock.advance(Duration::from_secs(10 * DAY));
        let before = fx.api.calls();

        let err = fx
            .service
            .change_display_name(&user, "Countess")
            .await
            .unwrap_err();

        assert_eq!(err, ProfileError::Cooldown { days_remaining: 50 });
        assert_eq!(fx.api.calls(), before);
        assert_eq!(
            fx.notifier.messages(),
            vec!["You can change your display name in 50 days".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_and_unchanged_names_are_rejected_in_order() {
        let fx = fixture();
        let user = fx.api.create_user(new_user("u1", "Ada")).await.expect("create");

        assert_eq!(
            fx.service.validate_display_name(&user, "   "),
            Err(ProfileError::EmptyName)
        );
        assert_eq!(
            fx.service.validate_display_name(&user, " Ada "),
            Err(ProfileError::SameName)
        );
        assert_eq!(
            fx.service.validate_display_name(&user, " Grace "),
            Ok("Grace".to_string())
        );
    }

    #[tokio::test]
    async fn successful_change_goes_through_the_api() {
        let fx = fixture();
        let user = fx.api.create_user(new_user("u1", "Ada")).await.expect("create");
        let updated = fx
            .service
            .change_display_name(&user, "Grace")
            .await
            .expect("change");
        assert_eq!(updated.display_name, "Grace");
        assert!(fx.notifier.messages().is_empty());
        assert!(!fx.service.name_change_status(&updated).can_change);
    }

    #[tokio::test]
    async fn unknown_user_reports_generic_failure() {
        let fx = fixture();
        let ghost = fx.api.create_user(new_user("u1", "Ada")).await.expect("create");
        let ghost = User {
            uid: "ghost".to_string(),
            ..ghost
        };
        let err = fx
            .service
            .change_display_name(&ghost, "Grace")
            .await
            .unwrap_err();
        assert_eq!(err, ProfileError::NotFound("ghost".to_string()));
        assert_eq!(
            fx.notifier.messages(),
            vec!["Failed to update display name".to_string()]
        );
    }
}
