//! Unit tests for the SQLite driver against in-memory databases.

use super::SqliteDriver;
use crate::drivers::DataDriver;
use crate::error::AcsysError;
use crate::models::{DatabaseType, FieldKind, LockState, OPEN_TABLES_TABLE, Record, USERS_TABLE};
use crate::query::{Operator, OrderBy, PageOptions, QueryOptions};
use serde_json::{Value, json};

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

async fn driver_with_posts() -> SqliteDriver {
    let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
    driver.initialize().await.unwrap();

    sqlx::query(
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, views INTEGER, score REAL)",
    )
    .execute(&driver.pool)
    .await
    .unwrap();

    let rows = [
        json!({"id": 1, "title": "alpha", "views": 5, "score": 1.5}),
        json!({"id": 2, "title": "5", "views": 10, "score": 2.0}),
        json!({"id": 3, "title": "gamma", "views": 5, "score": null}),
        json!({"id": 4, "title": null, "views": 20, "score": 0.5}),
        json!({"id": 5, "title": "epsilon", "views": 1, "score": 3.25}),
    ];
    for row in rows {
        driver.insert_doc("posts", &record(row)).await.unwrap();
    }

    driver
}

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let driver = SqliteDriver::new(":memory:").await.unwrap();
    driver.initialize().await.unwrap();
    driver.initialize().await.unwrap();

    assert!(driver.is_connected().await);
    assert!(driver.is_in_memory());
    assert_eq!(driver.database_type(), DatabaseType::Sqlite);

    let names = driver.table_names().await.unwrap();
    assert!(names.contains(&USERS_TABLE.to_string()));
    assert!(names.contains(&OPEN_TABLES_TABLE.to_string()));
    assert!(names.iter().all(|n| !n.starts_with("sqlite_")));
}

#[tokio::test]
async fn test_is_connected_after_close() {
    let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
    driver.close().await;
    assert!(!driver.is_connected().await);
}

#[tokio::test]
async fn test_debug_omits_connection_string() {
    let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
    let debug = format!("{:?}", driver);
    assert!(debug.contains("SqliteDriver"));
    assert!(!debug.contains("sqlite::memory:"));
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_empty_where_returns_every_record() {
    let driver = driver_with_posts().await;
    let mut found = ids(&driver.get_docs("posts", &QueryOptions::all()).await.unwrap());
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_equality_does_not_coerce() {
    let driver = driver_with_posts().await;

    let options = QueryOptions::all().with_filter("views", Operator::Eq, 5);
    let mut found = ids(&driver.get_docs("posts", &options).await.unwrap());
    found.sort_unstable();
    assert_eq!(found, vec![1, 3]);

    let options = QueryOptions::all().with_filter("views", Operator::Eq, "5");
    assert!(driver.get_docs("posts", &options).await.unwrap().is_empty());

    let options = QueryOptions::all().with_filter("title", Operator::Eq, 5);
    assert!(driver.get_docs("posts", &options).await.unwrap().is_empty());

    let options = QueryOptions::all().with_filter("title", Operator::Eq, "5");
    assert_eq!(ids(&driver.get_docs("posts", &options).await.unwrap()), vec![2]);
}

#[tokio::test]
async fn test_not_equal_includes_nulls() {
    let driver = driver_with_posts().await;
    let options = QueryOptions::all().with_filter("title", Operator::Ne, "alpha");
    let mut found = ids(&driver.get_docs("posts", &options).await.unwrap());
    found.sort_unstable();
    assert_eq!(found, vec![2, 3, 4, 5]);
}

#[tokio::test]
async fn test_null_filters() {
    let driver = driver_with_posts().await;

    let options = QueryOptions::all().with_filter("score", Operator::Eq, crate::query::QueryValue::Null);
    assert_eq!(ids(&driver.get_docs("posts", &options).await.unwrap()), vec![3]);

    let options = QueryOptions::all().with_filter("score", Operator::Ne, crate::query::QueryValue::Null);
    assert_eq!(driver.get_docs("posts", &options).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_arrays_compare_as_whole_values() {
    let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
    driver.initialize().await.unwrap();
    sqlx::query("CREATE TABLE tagged (id INTEGER PRIMARY KEY, tags TEXT)")
        .execute(&driver.pool)
        .await
        .unwrap();
    driver
        .insert_doc("tagged", &record(json!({"id": 6, "tags": ["a", "b"]})))
        .await
        .unwrap();
    driver
        .insert_doc("tagged", &record(json!({"id": 7, "tags": "a"})))
        .await
        .unwrap();

    let is_a = QueryOptions::all().with_filter("tags", Operator::Eq, "a");
    assert_eq!(ids(&driver.get_docs("tagged", &is_a).await.unwrap()), vec![7]);

    let not_a = QueryOptions::all().with_filter("tags", Operator::Ne, "a");
    assert_eq!(ids(&driver.get_docs("tagged", &not_a).await.unwrap()), vec![6]);
}

#[tokio::test]
async fn test_comparisons_are_anded() {
    let driver = driver_with_posts().await;
    let options = QueryOptions::all()
        .with_filter("views", Operator::Ge, 5)
        .with_filter("score", Operator::Lt, 2.0);
    let mut found = ids(&driver.get_docs("posts", &options).await.unwrap());
    found.sort_unstable();
    assert_eq!(found, vec![1, 4]);
}

#[tokio::test]
async fn test_unknown_field_matches_nothing() {
    let driver = driver_with_posts().await;
    let options = QueryOptions::all().with_filter("missing", Operator::Eq, "x");
    assert!(driver.get_docs("posts", &options).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_order_and_limit() {
    let driver = driver_with_posts().await;

    let options = QueryOptions::all().with_order(OrderBy::desc("views"));
    assert_eq!(
        ids(&driver.get_docs("posts", &options).await.unwrap()),
        vec![4, 2, 1, 3, 5]
    );

    let options = QueryOptions::all()
        .with_order(OrderBy::asc("views"))
        .with_limit(2);
    assert_eq!(ids(&driver.get_docs("posts", &options).await.unwrap()), vec![5, 1]);

    // Unknown order fields fall back to the primary key.
    let options = QueryOptions::all().with_order(OrderBy::desc("missing"));
    assert_eq!(
        ids(&driver.get_docs("posts", &options).await.unwrap()),
        vec![1, 2, 3, 4, 5]
    );
}

#[tokio::test]
async fn test_unknown_table_is_invalid_query() {
    let driver = driver_with_posts().await;
    let err = driver
        .get_docs("nope", &QueryOptions::all())
        .await
        .unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));

    let err = driver
        .get_docs("bad name;", &QueryOptions::all())
        .await
        .unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_pages_cover_table_without_duplicates() {
    let driver = driver_with_posts().await;
    let mut seen = Vec::new();
    let mut cursor = None;
    let mut pages = 0;

    loop {
        let options = PageOptions {
            page_size: Some(2),
            cursor: cursor.clone(),
            ..PageOptions::default()
        };
        let page = driver.get_page("posts", &options).await.unwrap();
        assert_eq!(page.total, 5);

        let again = driver.get_page("posts", &options).await.unwrap();
        assert_eq!(page, again);

        seen.extend(ids(&page.records));
        pages += 1;
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_filtered_page_total() {
    let driver = driver_with_posts().await;
    let options = PageOptions {
        filters: vec![crate::query::Filter::new("views", Operator::Eq, 5)],
        order: Some(OrderBy::desc("id")),
        page_size: Some(1),
        cursor: None,
    };
    let page = driver.get_page("posts", &options).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(ids(&page.records), vec![3]);
    assert!(page.previous_cursor.is_none());
    assert!(page.next_cursor.is_some());
}

#[tokio::test]
async fn test_malformed_cursor_rejected() {
    let driver = driver_with_posts().await;
    let options = PageOptions {
        cursor: Some("not a cursor!".to_string()),
        ..PageOptions::default()
    };
    let err = driver.get_page("posts", &options).await.unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));
}

// =============================================================================
// Metadata and writes
// =============================================================================

#[tokio::test]
async fn test_size_and_describe() {
    let driver = driver_with_posts().await;
    assert_eq!(driver.get_table_size("posts").await.unwrap(), 5);

    let columns = driver.describe_table("posts").await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "title", "views", "score"]);
    assert!(columns[0].is_primary_key);
    assert_eq!(columns[0].kind, FieldKind::Integer);
    assert_eq!(columns[1].kind, FieldKind::Text);
    assert_eq!(columns[3].kind, FieldKind::Float);
}

#[tokio::test]
async fn test_update_and_delete_counts() {
    let driver = driver_with_posts().await;

    let options = QueryOptions::all().with_filter("views", Operator::Eq, 5);
    let changed = driver
        .update_docs("posts", &options, &record(json!({"title": "updated"})))
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let options = QueryOptions::all().with_filter("title", Operator::Eq, "updated");
    assert_eq!(driver.get_docs("posts", &options).await.unwrap().len(), 2);

    let deleted = driver.delete_docs("posts", &options).await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(driver.get_table_size("posts").await.unwrap(), 3);
}

#[tokio::test]
async fn test_insert_rejects_unknown_column() {
    let driver = driver_with_posts().await;
    let err = driver
        .insert_doc("posts", &record(json!({"id": 9, "nope": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));
}

// =============================================================================
// Lock state
// =============================================================================

#[tokio::test]
async fn test_tables_start_locked_and_toggle() {
    let driver = driver_with_posts().await;
    assert!(!driver.check_open_table("posts").await.unwrap());

    driver.set_table_lock("posts", LockState::Unlocked).await.unwrap();
    driver.set_table_lock("posts", LockState::Unlocked).await.unwrap();
    assert!(driver.check_open_table("posts").await.unwrap());
    assert_eq!(driver.get_table_size(OPEN_TABLES_TABLE).await.unwrap(), 1);

    let tables = driver.list_tables().await.unwrap();
    let posts = tables.iter().find(|t| t.name == "posts").unwrap();
    assert_eq!(posts.lock_state, LockState::Unlocked);
    assert_eq!(posts.row_count, 5);

    driver.set_table_lock("posts", LockState::Locked).await.unwrap();
    driver.set_table_lock("posts", LockState::Locked).await.unwrap();
    assert!(!driver.check_open_table("posts").await.unwrap());
}

#[tokio::test]
async fn test_reserved_tables_never_unlock() {
    let driver = driver_with_posts().await;
    let err = driver
        .set_table_lock(USERS_TABLE, LockState::Unlocked)
        .await
        .unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));
    assert!(!driver.check_open_table(USERS_TABLE).await.unwrap());

    driver.set_table_lock(USERS_TABLE, LockState::Locked).await.unwrap();
}

#[tokio::test]
async fn test_unlocking_missing_table_fails() {
    let driver = driver_with_posts().await;
    let err = driver
        .set_table_lock("ghost", LockState::Unlocked)
        .await
        .unwrap_err();
    assert!(matches!(err, AcsysError::InvalidQuery { .. }));
}

#[tokio::test]
async fn test_verify_password_lookup() {
    let driver = driver_with_posts().await;
    let user = record(json!({
        "acsys_id": "u1",
        "username": "admin",
        "email": "",
        "role": "Administrator",
        "mode": "",
        "acsys_cd": "$argon2id$stored",
    }));
    driver.insert_doc(USERS_TABLE, &user).await.unwrap();

    assert_eq!(driver.verify_password("u1").await.unwrap(), "$argon2id$stored");
    let err = driver.verify_password("u2").await.unwrap_err();
    assert!(matches!(err, AcsysError::NotFound { .. }));

    let users = driver.get_users(&QueryOptions::all()).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "admin");
}
