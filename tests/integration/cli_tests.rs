//! Admin tool exit codes and output.

use std::process::Output;

use bytes::Bytes;
use tokio::process::Command;

use tilecache_cassandra::store::BucketStore;

use super::test_utils::{cassandra_node, cassandra_store, closed_port};

async fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tilecache-cassandra"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("TILECACHE_KEYSPACE")
        .env_remove("TILECACHE_CASSANDRA_USERNAME")
        .env_remove("TILECACHE_CASSANDRA_PASSWORD")
        .output()
        .await
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test]
async fn test_missing_arguments_exit_2() {
    let output = run(&[]).await;
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Usage"));

    let output = run(&["localhost"]).await;
    assert_eq!(output.status.code(), Some(2));
}

#[tokio::test]
async fn test_invalidate_without_layer_exit_3() {
    let output = run(&["localhost", "invalidate"]).await;
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("No layer specified!"));
}

#[tokio::test]
async fn test_unknown_command_exit_4() {
    let output = run(&["localhost", "purge"]).await;
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("Invalid command specified: purge"));
}

#[tokio::test]
async fn test_unreachable_node_exit_1() {
    let addr = closed_port().await;
    let output = run(&[&addr, "counts"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error:"));
}

#[tokio::test]
#[ignore = "needs a Cassandra node at TILECACHE_TEST_CASSANDRA"]
async fn test_counts() {
    let store = cassandra_store("tilecache_it_cli_counts").await;
    store.put("basic", &[0, 0, 0, 1, 0, 0, 0, 0], Bytes::from_static(b"a")).await.unwrap();
    store.put("basic", &[0, 0, 0, 1, 0, 0, 0, 1], Bytes::from_static(b"b")).await.unwrap();
    store.put("roads", &[0; 8], Bytes::from_static(b"c")).await.unwrap();

    let node = cassandra_node();
    let output = run(&[&node, "counts", "--keyspace", "tilecache_it_cli_counts"]).await;
    assert!(output.status.success());
    let mut lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    lines.sort();
    assert_eq!(lines, vec!["basic: 2", "roads: 1"]);

    let output = run(&[&node, "counts", "roads", "--keyspace", "tilecache_it_cli_counts"]).await;
    assert!(output.status.success());
    assert_eq!(stdout(&output), "roads: 1\n");
}

#[tokio::test]
#[ignore = "needs a Cassandra node at TILECACHE_TEST_CASSANDRA"]
async fn test_counts_json() {
    let store = cassandra_store("tilecache_it_cli_json").await;
    store.put("basic", &[0; 8], Bytes::from_static(b"a")).await.unwrap();

    let node = cassandra_node();
    let output = run(&[&node, "counts", "--json", "--keyspace", "tilecache_it_cli_json"]).await;
    assert!(output.status.success());

    let counts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(counts, serde_json::json!([{ "layer": "basic", "tiles": 1 }]));
}

#[tokio::test]
#[ignore = "needs a Cassandra node at TILECACHE_TEST_CASSANDRA"]
async fn test_invalidate() {
    let store = cassandra_store("tilecache_it_cli_invalidate").await;
    store.put("basic", &[0; 8], Bytes::from_static(b"a")).await.unwrap();
    store.put("roads", &[0; 8], Bytes::from_static(b"b")).await.unwrap();

    let node = cassandra_node();
    let output = run(&[&node, "invalidate", "basic", "--keyspace", "tilecache_it_cli_invalidate"]).await;
    assert!(output.status.success());
    assert_eq!(stdout(&output), "Invalidated basic\n");
    assert_eq!(store.count("basic").await.unwrap(), 0);
    assert_eq!(store.count("roads").await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "needs a Cassandra node at TILECACHE_TEST_CASSANDRA"]
async fn test_schema_with_keyspace() {
    let node = cassandra_node();
    let output = run(&[&node, "schema", "--keyspace", "tilecache_it_cli_schema"]).await;
    assert!(output.status.success());
    assert!(stdout(&output).contains("tilecache_it_cli_schema"));

    // The table now accepts tiles
    let store = cassandra_store("tilecache_it_cli_schema").await;
    store.put("basic", &[0; 8], Bytes::new()).await.unwrap();
    assert_eq!(store.count("basic").await.unwrap(), 1);
}
