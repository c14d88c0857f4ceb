use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use gatehouse_core::{
    AdminCredential, Backends, ErrorKind, ExpiryPolicy, GeoPolicyPatch, InsertOutcome,
    ManualClock, MemberId, Portal, Session, StreamSettings,
};
use gatehouse_data::PgBackend;
use gatehouse_test_support::postgres::start_postgres;

async fn with_backends<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(Backends) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let database = match start_postgres() {
        Ok(database) => database,
        Err(err) => {
            eprintln!("skipping postgres backend tests: {err:#}");
            return Ok(());
        }
    };
    let backend = PgBackend::connect(database.connection_string())
        .await
        .context("failed to connect to test database")?;
    let result = test(backend.backends()).await;
    backend.pool().close().await;
    drop(database);
    result
}

fn id(raw: &str) -> MemberId {
    MemberId::parse(raw).unwrap_or_else(|err| panic!("fixture id {raw}: {err}"))
}

#[tokio::test]
async fn identifiers_round_trip_through_postgres() -> Result<()> {
    with_backends(|backends| async move {
        let store = backends.identifiers;
        assert!(store.insert(&id("22222222")).await?);
        assert!(!store.insert(&id("22222222")).await?);
        let added = store
            .insert_many(&[id("11111111"), id("22222222"), id("33333333")])
            .await?;
        assert_eq!(added, 2);
        assert_eq!(
            store.list().await?,
            vec![id("11111111"), id("22222222"), id("33333333")]
        );
        assert!(store.remove(&id("11111111")).await?);
        assert!(!store.contains(&id("11111111")).await?);
        assert_eq!(store.clear().await?, 2);
        assert_eq!(store.count().await?, 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn session_namespaces_are_isolated() -> Result<()> {
    with_backends(|backends| async move {
        let now = Utc::now();
        let member_policy = ExpiryPolicy::member_default();
        let admin_policy = ExpiryPolicy::admin_default();
        let member = Session::issue("12345678", now);
        let admin = Session::issue("admin", now);
        let member_token = member.token.as_str().to_string();

        assert_eq!(
            backends
                .member_sessions
                .insert(member, &member_policy, now)
                .await?,
            InsertOutcome::Inserted
        );
        backends
            .admin_sessions
            .insert(admin, &admin_policy, now)
            .await?;
        assert!(
            backends
                .admin_sessions
                .list()
                .await?
                .iter()
                .all(|session| session.token.as_str() != member_token)
        );
        assert_eq!(backends.member_sessions.clear().await?, 1);
        assert_eq!(backends.admin_sessions.list().await?.len(), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn touch_and_reap_honour_policy() -> Result<()> {
    with_backends(|backends| async move {
        let start = Utc::now();
        let policy = ExpiryPolicy::member_default();
        let sessions = backends.member_sessions;
        let session = Session::issue("12345678", start);
        let token = session.token.as_str().to_string();
        sessions.insert(session, &policy, start).await?;

        let later = start + ChronoDuration::minutes(20);
        let touched = sessions.touch(&token, &policy, later).await?;
        assert_eq!(touched.map(|s| s.last_activity_at.timestamp()), Some(later.timestamp()));

        let idle = later + ChronoDuration::minutes(31);
        assert_eq!(sessions.reap(&policy, idle).await?, 1);
        assert!(sessions.touch(&token, &policy, idle).await?.is_none());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn settings_and_credentials_persist() -> Result<()> {
    with_backends(|backends| async move {
        assert!(backends.settings.load_stream().await?.is_none());
        let stream = StreamSettings {
            no_stream: true,
            ..StreamSettings::default()
        };
        backends.settings.store_stream(&stream).await?;
        assert_eq!(backends.settings.load_stream().await?, Some(stream));

        let credential = AdminCredential {
            username: "admin".into(),
            password_hash: "$argon2id$stub".into(),
        };
        assert!(backends.credentials.store_if_absent(&credential).await?);
        assert!(!backends.credentials.store_if_absent(&credential).await?);
        assert_eq!(backends.credentials.load().await?, Some(credential));
        Ok(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_are_serialised_by_the_database() -> Result<()> {
    with_backends(|backends| async move {
        let clock = ManualClock::new(Utc::now());
        let portal = Portal::assemble(
            backends,
            ExpiryPolicy::member_default(),
            ExpiryPolicy::admin_default(),
            Arc::new(clock),
        );
        portal.admin.add_identifier("12345678").await?;
        portal
            .admin
            .update_geo_policy(GeoPolicyPatch::default())
            .await?;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let access = portal.access.clone();
            tasks.push(tokio::spawn(async move {
                access.login("12345678", None).await
            }));
        }
        let mut successes = 0;
        for task in tasks {
            match task.await? {
                Ok(_) => successes += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(successes, 1);
        Ok(())
    })
    .await
}
