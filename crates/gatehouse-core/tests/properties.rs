use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use gatehouse_core::{
    ErrorKind, ExpiryPolicy, GateError, ManualClock, MemberId, Portal, memory_backends,
};

fn portal(clock: &ManualClock) -> Portal {
    Portal::assemble(
        memory_backends(),
        ExpiryPolicy::member_default(),
        ExpiryPolicy::admin_default(),
        Arc::new(clock.clone()),
    )
}

fn id(raw: &str) -> MemberId {
    MemberId::parse(raw).unwrap_or_else(|err| panic!("fixture id {raw}: {err}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_yield_exactly_one_session() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let portal = portal(&clock);
    portal.admin.add_identifier("12345678").await?;

    let attempts = 32;
    let mut tasks = Vec::with_capacity(attempts);
    for _ in 0..attempts {
        let access = portal.access.clone();
        tasks.push(tokio::spawn(async move {
            access.login("12345678", None).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Conflict);
                conflicts += 1;
            }
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, attempts - 1);
    assert_eq!(portal.access.sessions().count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn conflicting_login_keeps_original_session() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let portal = portal(&clock);
    portal.admin.add_identifier("12345678").await?;
    let original = portal.access.login("12345678", None).await?;

    let err = portal.access.login("12345678", None).await.unwrap_err();
    assert!(matches!(err, GateError::AlreadyActive { .. }));
    let checked = portal.access.check_access(original.token.as_str()).await?;
    assert_eq!(checked.owner, "12345678");
    Ok(())
}

#[tokio::test]
async fn session_older_than_a_day_is_refused() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let portal = Portal::assemble(
        memory_backends(),
        ExpiryPolicy {
            idle_ttl: None,
            ..ExpiryPolicy::member_default()
        },
        ExpiryPolicy::admin_default(),
        Arc::new(clock.clone()),
    );
    portal.admin.add_identifier("12345678").await?;
    let session = portal.access.login("12345678", None).await?;

    clock.advance(ChronoDuration::hours(23));
    portal.access.check_access(session.token.as_str()).await?;
    clock.advance(ChronoDuration::hours(2));
    let err = portal
        .access
        .check_access(session.token.as_str())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    Ok(())
}

#[tokio::test]
async fn bulk_add_reports_exact_count() -> Result<()> {
    let portal = portal(&ManualClock::default());
    let report = portal
        .admin
        .add_identifiers_bulk("11111111,22222222,bad,11111111")
        .await?;
    assert_eq!(report.added, 2);
    let snapshot = portal.admin.dashboard().await?;
    assert_eq!(snapshot.identifiers, vec!["11111111", "22222222"]);
    Ok(())
}

#[tokio::test]
async fn remove_all_then_add_succeeds() -> Result<()> {
    let portal = portal(&ManualClock::default());
    portal.admin.add_identifiers_bulk("11111111\n22222222").await?;
    let session = portal.access.login("11111111", None).await?;
    assert_eq!(portal.admin.remove_all_identifiers().await?, 2);
    assert!(portal.access.check_access(session.token.as_str()).await.is_err());
    assert_eq!(portal.admin.add_identifier("11111111").await?, id("11111111"));
    Ok(())
}

#[tokio::test]
async fn kick_affects_only_the_named_token() -> Result<()> {
    let portal = portal(&ManualClock::default());
    portal.admin.add_identifiers_bulk("11111111,22222222").await?;
    let kicked = portal.access.login("11111111", None).await?;
    let other = portal.access.login("22222222", None).await?;

    assert_eq!(portal.admin.kick_session(kicked.token.as_str()).await?, "11111111");
    assert!(portal.access.check_access(kicked.token.as_str()).await.is_err());
    portal.access.check_access(other.token.as_str()).await?;
    portal.access.login("11111111", None).await?;
    Ok(())
}

#[tokio::test]
async fn invalid_identifiers_never_enter_the_registry() -> Result<()> {
    let portal = portal(&ManualClock::default());
    for raw in ["", "1234567", "123456789", "1234567a", "１２３４５６７８"] {
        let err = portal.admin.add_identifier(raw).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(portal.admin.dashboard().await?.identifier_count, 0);
    Ok(())
}
