use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use session::store::{FileStorage, KeyValueStorage};
use session::{Credentials, InMemorySessionCache, SessionConfig, SessionManager, Session};

use mock_identity::{Reply, StubIdentityService};

/// Fresh storage file per test run
fn storage_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("session-it-{}", Uuid::new_v4()))
        .join("storage.json")
}

fn boot(
    path: &Path,
    identity: Arc<StubIdentityService>,
) -> anyhow::Result<SessionManager<StubIdentityService, FileStorage>> {
    let storage = Arc::new(FileStorage::open(path)?);
    Ok(SessionManager::new(
        identity,
        storage,
        Arc::new(InMemorySessionCache::new()),
        &SessionConfig::default(),
    ))
}

#[tokio::test]
async fn session_survives_restart_and_is_revalidated() -> anyhow::Result<()> {
    let path = storage_path();

    // First run: log in, which writes every slot to disk
    let identity = Arc::new(StubIdentityService::new());
    identity
        .account(
            "user@example.com",
            "pw",
            r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600,"user":{"id":"U1"}}"#,
        )
        .await;

    let manager = boot(&path, identity.clone())?;
    let outcome = manager
        .login(&Credentials::new("user@example.com", "pw"))
        .await;
    assert!(outcome.is_success());
    drop(manager);

    // Simulate restart: new process, new cache, identity SDK lost its state
    let identity2 = Arc::new(StubIdentityService::new());
    identity2.reply([Reply::Transient]).await;
    identity2
        .honour(
            "T1",
            Session::new("T2")
                .with_refresh_token("R2")
                .with_expires_at(Utc.timestamp_opt(1_900_000_000, 0).unwrap())
                .with_user_id("U1"),
        )
        .await;

    let manager2 = boot(&path, identity2.clone())?;

    // cheap local check works before any network
    assert!(manager2.is_authenticated());

    let s = manager2.initialize().await.expect("session should be restored");
    assert_eq!(s.access_token, "T2");

    let adopted = identity2.adopted().await;
    assert_eq!(adopted.len(), 1);
    assert_eq!(adopted[0].access_token, "T1");
    assert_eq!(adopted[0].refresh_token, "R1");

    // the rotated token is what's on disk now
    let on_disk = FileStorage::open(&path)?;
    assert_eq!(on_disk.get("auth_token").as_deref(), Some("T2"));

    // Logout, third run starts signed out
    manager2.logout().await;
    drop(manager2);

    let identity3 = Arc::new(StubIdentityService::new());
    let manager3 = boot(&path, identity3)?;
    assert!(!manager3.is_authenticated());
    assert!(manager3.initialize().await.is_none());

    let _ = fs::remove_dir_all(path.parent().unwrap());
    Ok(())
}

#[tokio::test]
async fn half_written_storage_is_tolerated() -> anyhow::Result<()> {
    let path = storage_path();

    // a crash after the legacy write, mid-way through the provider slot
    {
        let storage = FileStorage::open(&path)?;
        storage.set("auth_token", "T_LEGACY")?;
        storage.set("sb-auth-token", r#"{"currentSession":{"access_tok"#)?;
    }

    let identity = Arc::new(StubIdentityService::new());
    identity.reply([Reply::Absent]).await;
    identity
        .honour("T_LEGACY", Session::new("T_LEGACY").with_user_id("U1"))
        .await;

    let manager = boot(&path, identity.clone())?;
    let s = manager.initialize().await.expect("legacy token should revalidate");

    assert_eq!(s.user_id.as_deref(), Some("U1"));
    assert_eq!(identity.adopted().await[0].refresh_token, "");

    // all slots repaired
    let on_disk = FileStorage::open(&path)?;
    assert!(on_disk.get("app_session").unwrap().contains("T_LEGACY"));
    assert!(on_disk.get("sb-auth-token").unwrap().contains("T_LEGACY"));

    let _ = fs::remove_dir_all(path.parent().unwrap());
    Ok(())
}

#[tokio::test]
async fn logout_reports_storage_it_could_not_rewrite() -> anyhow::Result<()> {
    let path = storage_path();
    let identity = Arc::new(StubIdentityService::new());
    identity
        .account(
            "user@example.com",
            "pw",
            r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600,"user":{"id":"U1"}}"#,
        )
        .await;

    let manager = boot(&path, identity)?;
    assert!(
        manager
            .login(&Credentials::new("user@example.com", "pw"))
            .await
            .is_success()
    );

    // a directory where the temp file goes makes every flush fail
    let blocker = path.with_extension("tmp");
    fs::create_dir_all(&blocker)?;

    let outcome = manager.logout().await;
    assert!(outcome.error.is_none());
    assert!(outcome.storage_error.is_some());
    assert!(!outcome.is_success());
    // this process is signed out even though the file still holds T1
    assert!(!manager.is_authenticated());
    assert_eq!(FileStorage::open(&path)?.get("auth_token").as_deref(), Some("T1"));

    // once the disk recovers, clearing again catches the file up
    fs::remove_dir(&blocker)?;
    manager.clear()?;
    let on_disk = FileStorage::open(&path)?;
    for key in ["auth_token", "sb-auth-token", "app_session"] {
        assert!(on_disk.get(key).is_none(), "{key} still on disk");
    }

    let _ = fs::remove_dir_all(path.parent().unwrap());
    Ok(())
}
