//! MemcacheLock against a memcached server over TCP.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tilecache_cassandra::error::LockError;
use tilecache_cassandra::lock::{AdvisoryLock, LockAttempt, MemcacheLock};

use super::test_utils::{closed_port, FakeMemcached};

const TTL: Duration = Duration::from_secs(30);

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[tokio::test]
async fn test_acquire_release_cycle() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    assert!(lock.try_acquire("basic/10/20/5", TTL).await);
    assert!(server.holds("basic/10/20/5"));
    assert_eq!(lock.attempt("basic/10/20/5", TTL).await, LockAttempt::Held);

    lock.release("basic/10/20/5").await;
    assert!(!server.holds("basic/10/20/5"));
    assert!(lock.try_acquire("basic/10/20/5", TTL).await);
}

#[tokio::test]
async fn test_add_wire_format() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    assert!(lock.try_acquire("basic/1/2/3", TTL).await);
    lock.release("basic/1/2/3").await;

    let commands = server.commands();
    assert_eq!(commands.len(), 2);

    let parts: Vec<&str> = commands[0].split(' ').collect();
    assert_eq!(parts[0], "add");
    assert_eq!(parts[1], "basic/1/2/3");
    assert_eq!(parts[2], "0");
    assert_eq!(parts[4], "1");
    assert_eq!(commands[1], "delete basic/1/2/3");
}

#[tokio::test]
async fn test_expiry_is_absolute() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    let before = unix_now();
    assert!(lock.try_acquire("basic/0/0/0", TTL).await);
    let after = unix_now();

    let expiry = server.expiry("basic/0/0/0").unwrap();
    assert!(expiry >= before + TTL.as_secs());
    assert!(expiry <= after + TTL.as_secs() + 1);
}

#[tokio::test]
async fn test_release_missing_key_is_silent() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    lock.release("never/0/0/0").await;
    assert!(!lock.delete("never/0/0/0").await.unwrap());
}

#[tokio::test]
async fn test_lost_lock_allows_reacquire() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    assert!(lock.try_acquire("basic/4/4/4", TTL).await);
    server.flush_all();
    assert!(lock.try_acquire("basic/4/4/4", TTL).await);
}

#[tokio::test]
async fn test_invalid_key_is_hashed() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    let key = "osm bright/1/2/3";
    assert!(lock.try_acquire(key, TTL).await);
    assert!(!server.holds(key));
    assert!(!lock.try_acquire(key, TTL).await);

    let sent = server.commands()[0].split(' ').nth(1).unwrap().to_string();
    assert_eq!(sent.len(), 64);

    lock.release(key).await;
    assert!(!server.holds(&sent));
}

#[tokio::test]
async fn test_keys_spread_over_servers() {
    let first = FakeMemcached::start().await;
    let second = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![first.addr(), second.addr()]);

    for x in 0..64 {
        assert!(lock.try_acquire(&format!("basic/{}/0/8", x), TTL).await);
    }

    let on_first = first.commands().len();
    let on_second = second.commands().len();
    assert_eq!(on_first + on_second, 64);
    assert!(on_first > 0);
    assert!(on_second > 0);

    // Each key always lands on the same server
    for x in 0..64 {
        assert!(!lock.try_acquire(&format!("basic/{}/0/8", x), TTL).await);
    }
}

#[tokio::test]
async fn test_unreachable_server_reports_not_acquired() {
    let lock = MemcacheLock::new(vec![closed_port().await]);

    assert_eq!(lock.attempt("basic/0/0/0", TTL).await, LockAttempt::Unavailable);
    lock.release("basic/0/0/0").await;

    // Second attempt skips the dead server without connecting
    assert!(matches!(
        lock.add("basic/0/0/0", 0).await,
        Err(LockError::Dead(_))
    ));
}

#[tokio::test]
async fn test_error_reply_reports_not_acquired() {
    let server = FakeMemcached::start_with_reply("SERVER_ERROR out of memory storing object").await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    assert_eq!(lock.attempt("basic/0/0/0", TTL).await, LockAttempt::Unavailable);
    assert!(lock.add("basic/0/0/0", 0).await.is_err());
    lock.release("basic/0/0/0").await;
}

#[tokio::test]
async fn test_connections_are_reused() {
    let server = FakeMemcached::start().await;
    let lock = MemcacheLock::new(vec![server.addr()]);

    for x in 0..10 {
        let key = format!("basic/{}/0/4", x);
        assert!(lock.try_acquire(&key, TTL).await);
        lock.release(&key).await;
    }

    assert_eq!(server.commands().len(), 20);
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_concurrent_acquire_single_winner() {
    let server = FakeMemcached::start().await;
    let lock = std::sync::Arc::new(MemcacheLock::new(vec![server.addr()]));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lock = std::sync::Arc::clone(&lock);
        handles.push(tokio::spawn(async move {
            lock.try_acquire("basic/3/3/3", TTL).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
