//! End-to-end delivery scenarios against the SQLite store.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::StreamExt;
use parley_core::delivery::DeliveryRouter;
use parley_core::repository::message::MessageStore;
use parley_core::service::account::AccountService;
use parley_core::session::SessionRegistry;
use parley_infra::crypto::credentials::Argon2CredentialHasher;
use parley_infra::sqlite::account::SqliteAccountRepository;
use parley_infra::sqlite::message::SqliteMessageStore;
use parley_infra::sqlite::pool::DatabasePool;
use parley_types::config::GlobalConfig;
use parley_types::error::{AccountError, SendError};
use parley_types::event::ServerEvent;
use parley_types::message::DeliveryState;
use parley_types::user::UserId;
use secrecy::{ExposeSecret, SecretString};

async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scenario.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    DatabasePool::new(&url).await.unwrap()
}

fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

fn router(pool: &DatabasePool) -> (DeliveryRouter<SqliteMessageStore>, Arc<SessionRegistry>) {
    let config = GlobalConfig {
        push_timeout_ms: 100,
        ..GlobalConfig::default()
    };
    let registry = Arc::new(SessionRegistry::new(config.mailbox_capacity));
    let store = Arc::new(SqliteMessageStore::new(pool.clone()));
    (
        DeliveryRouter::new(store, Arc::clone(&registry), &config),
        registry,
    )
}

#[tokio::test]
async fn offline_receiver_catches_up_through_history() {
    let pool = test_pool().await;
    let (router, registry) = router(&pool);
    let (alice, _alice_rx) = registry.connect(uid("alice"));

    let receipt = router.send(&alice, &uid("bob"), "hi").await.unwrap();
    assert_eq!(receipt.message.message_id, 1);
    assert!(receipt.message.delivered.is_empty());
    assert_eq!(receipt.outcome, DeliveryState::Delivered);

    let (bob, _bob_rx) = registry.connect(uid("bob"));
    let history: Vec<_> = router
        .history_query(&bob.user_id, &uid("alice"), 0, 10)
        .stream(Arc::clone(router.store()))
        .collect()
        .await;

    assert_eq!(history.len(), 1);
    let first = history[0].as_ref().unwrap();
    assert_eq!(first.message_id, 1);
    assert_eq!(first.body, "hi");
}

#[tokio::test]
async fn multi_device_sender_and_online_receiver() {
    let pool = test_pool().await;
    let (router, registry) = router(&pool);
    let (phone, _phone_rx) = registry.connect(uid("alice"));
    let (laptop, mut laptop_rx) = registry.connect(uid("alice"));
    let (bob, mut bob_rx) = registry.connect(uid("bob"));

    let receipt = router.send(&phone, &uid("bob"), "on my way").await.unwrap();
    assert_eq!(
        receipt.message.delivered,
        BTreeSet::from([laptop.session_id, bob.session_id])
    );

    for rx in [&mut laptop_rx, &mut bob_rx] {
        match rx.recv().await.unwrap() {
            ServerEvent::NewMessage(m) => {
                assert_eq!(m.sender.as_str(), "alice");
                assert_eq!(m.message, "on my way");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    let stored = router
        .store()
        .get(&receipt.message.conversation_id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.delivered.len(), 2);
}

#[tokio::test]
async fn concurrent_senders_leave_no_gaps() {
    let pool = test_pool().await;
    let (router, registry) = router(&pool);
    let router = Arc::new(router);
    let (alice, _a) = registry.connect(uid("alice"));
    let (bob, _b) = registry.connect(uid("bob"));

    let mut handles = Vec::new();
    for i in 0..20 {
        let router = Arc::clone(&router);
        let (origin, peer) = if i % 2 == 0 {
            (alice.clone(), uid("bob"))
        } else {
            (bob.clone(), uid("alice"))
        };
        handles.push(tokio::spawn(async move {
            router.send(&origin, &peer, &format!("#{i}")).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let history = router
        .history_query(&uid("alice"), &uid("bob"), 0, 100)
        .collect(Arc::clone(router.store()))
        .await
        .unwrap();
    let ids: Vec<u64> = history.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn unavailable_storage_fails_the_send() {
    let pool = test_pool().await;
    let (router, registry) = router(&pool);
    let (alice, _a) = registry.connect(uid("alice"));
    let (_bob, mut bob_rx) = registry.connect(uid("bob"));
    pool.close().await;

    let err = router.send(&alice, &uid("bob"), "hi").await.unwrap_err();
    assert!(matches!(err, SendError::SendFailed(_)));
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn account_flow_with_real_hashing() {
    let pool = test_pool().await;
    let accounts = AccountService::new(
        Arc::new(SqliteAccountRepository::new(pool.clone())),
        Arc::new(Argon2CredentialHasher::new()),
    );
    let pw = SecretString::from("hunter2".to_string());

    accounts.register("alice", &pw).await.unwrap();
    assert!(matches!(
        accounts.register("alice", &pw).await,
        Err(AccountError::AlreadyExists(_))
    ));

    let wrong = SecretString::from("hunter3".to_string());
    assert!(matches!(
        accounts.login("alice", &wrong).await,
        Err(AccountError::InvalidCredentials)
    ));
    assert!(matches!(
        accounts.login("bob", &pw).await,
        Err(AccountError::InvalidCredentials)
    ));

    let grant = accounts.login("alice", &pw).await.unwrap();
    let token = grant.token.expose_secret().to_string();
    assert!(token.starts_with("pk_"));
    assert_eq!(accounts.authenticate(&token).await.unwrap(), uid("alice"));

    accounts.logout(&token).await.unwrap();
    assert!(matches!(
        accounts.authenticate(&token).await,
        Err(AccountError::InvalidToken)
    ));
}
