use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use yoostream::api::MediaApi;
use yoostream::app::{build_client, build_router, AppState, ClientServices};
use yoostream::cache::ManualClock;
use yoostream::catalog::InMemoryCatalog;
use yoostream::config::AppConfig;
use yoostream::notify::RecordingNotifier;
use yoostream::profile::{DeviceInfo, InMemoryProfileStore, NewUser, ProfileError};

const DAY: u64 = 24 * 60 * 60;

struct Served {
    client: ClientServices,
    clock: ManualClock,
    notifier: Arc<RecordingNotifier>,
}

/// Serves the router on an ephemeral port and points a client at it.
async fn serve() -> Served {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 1, 10, 0, 0).unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    let media = Arc::new(MediaApi::new(
        Arc::new(InMemoryCatalog::seeded().unwrap()),
        notifier.clone(),
        Duration::from_secs(300),
        64,
        Arc::new(clock.clone()),
    ));
    let app = build_router(AppState {
        media: media.clone(),
        profiles: Arc::new(InMemoryProfileStore::new(Arc::new(clock.clone()), 60)),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = AppConfig {
        profile_api_url: format!("http://{addr}/api"),
        ..AppConfig::default()
    };
    let client = build_client(&config, media, notifier.clone(), Arc::new(clock.clone())).unwrap();
    Served {
        client,
        clock,
        notifier,
    }
}

fn new_user(uid: &str) -> NewUser {
    NewUser {
        uid: uid.to_string(),
        email: format!("{uid}@example.com"),
        display_name: Some("Ada".to_string()),
        photo_url: None,
        device_info: DeviceInfo {
            browser: "Firefox 125.0".to_string(),
            os: "Linux".to_string(),
            device: "Desktop".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/125.0".to_string(),
        },
        ip_address: "198.51.100.4".to_string(),
    }
}

#[tokio::test]
async fn unknown_user_maps_to_not_found() {
    let s = serve().await;
    let err = s.client.profiles.api().get_user("ghost").await.unwrap_err();
    assert_eq!(err, ProfileError::NotFound("ghost".to_string()));
}

#[tokio::test]
async fn created_user_reads_back() {
    let s = serve().await;
    let api = s.client.profiles.api();
    let created = api.create_user(new_user("u 1")).await.unwrap();
    assert_eq!(created.display_name, "Ada");

    let fetched = api.get_user("u 1").await.unwrap();
    assert_eq!(fetched.uid, "u 1");
    assert_eq!(fetched.email, "u 1@example.com");
}

#[tokio::test]
async fn server_cooldown_maps_back_to_cooldown() {
    let s = serve().await;
    let api = s.client.profiles.api();
    api.create_user(new_user("u-3")).await.unwrap();

    let renamed = api.change_display_name("u-3", "Grace").await.unwrap();
    assert_eq!(renamed.display_name, "Grace");

    s.clock.advance(Duration::from_secs(10 * DAY));
    let err = api.change_display_name("u-3", "Hopper").await.unwrap_err();
    assert_eq!(err, ProfileError::Cooldown { days_remaining: 50 });
}

#[tokio::test]
async fn stale_local_copy_still_hits_server_cooldown() {
    let s = serve().await;
    let api = s.client.profiles.api().clone();
    let before = api.create_user(new_user("u-4")).await.unwrap();
    api.change_display_name("u-4", "Grace").await.unwrap();

    // `before` predates the rename, so only the server knows about it.
    let err = s
        .client
        .profiles
        .change_display_name(&before, "Hopper")
        .await
        .unwrap_err();
    assert_eq!(err, ProfileError::Cooldown { days_remaining: 60 });
    assert_eq!(
        s.notifier.messages(),
        vec!["You can change your display name in 60 days".to_string()]
    );
}
