//! MySQL driver integration tests using testcontainers.
//!
//! This test suite covers:
//! - Metadata provisioning
//! - Comparison without type coercion
//! - Null-aware inequality
//! - Deterministic paging
//! - Column introspection from INFORMATION_SCHEMA

#![cfg(feature = "mysql")]

use acsys_core::drivers::mysql::MySqlDriver;
use acsys_core::{
    AcsysError, DataDriver, FieldKind, LockState, PageOptions, QueryOptions, Record, Result,
    models::USERS_TABLE,
};
use serde_json::Value;
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Helper function to wait for MySQL to be ready
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> Result<()> {
    let mut attempts = 0;
    while attempts < max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                pool.close().await;
                return Ok(());
            }
            pool.close().await;
        }
        attempts += 1;
        if attempts < max_attempts {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
    Err(AcsysError::connection_failed(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!(
            "MySQL failed to become ready after {} attempts",
            max_attempts
        ),
    )))
}

async fn seed(database_url: &str) {
    let pool = MySqlPool::connect(database_url).await.unwrap();
    sqlx::query(
        "CREATE TABLE posts (
            id INT PRIMARY KEY,
            title VARCHAR(100) NULL,
            views INT,
            featured TINYINT(1),
            published_at DATETIME NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO posts (id, title, views, featured, published_at) VALUES
            (1, 'alpha', 5, 1, '2024-01-01 10:00:00'),
            (2, '5', 10, 0, NULL),
            (3, 'gamma', 5, 0, '2024-02-01 10:00:00'),
            (4, NULL, 20, 1, NULL),
            (5, 'epsilon', 1, 0, NULL)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;
}

fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

#[tokio::test]
async fn test_mysql_integration_driver_semantics() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&database_url, 30).await?;
    seed(&database_url).await;

    let driver = MySqlDriver::new(&database_url).await?;
    driver.initialize().await?;
    driver.initialize().await?;
    assert!(driver.is_connected().await);

    let names = driver.table_names().await?;
    assert!(names.contains(&USERS_TABLE.to_string()));
    assert!(names.contains(&"posts".to_string()));

    // No coercion between text and numbers.
    let text_five = QueryOptions::parse(r#"{"where": [["title", "=", "5"]]}"#)?;
    assert_eq!(ids(&driver.get_docs("posts", &text_five).await?), vec![2]);
    let number_five = QueryOptions::parse(r#"{"where": [["title", "=", 5]]}"#)?;
    assert!(driver.get_docs("posts", &number_five).await?.is_empty());
    let views = QueryOptions::parse(r#"{"where": [["views", "=", 5]]}"#)?;
    assert_eq!(ids(&driver.get_docs("posts", &views).await?), vec![1, 3]);

    // Inequality includes nulls.
    let not_alpha = QueryOptions::parse(
        r#"{"where": [["title", "!=", "alpha"]], "order": ["id", "asc"]}"#,
    )?;
    assert_eq!(ids(&driver.get_docs("posts", &not_alpha).await?), vec![2, 3, 4, 5]);

    let untitled = QueryOptions::parse(r#"{"where": [["title", "=", null]]}"#)?;
    assert_eq!(ids(&driver.get_docs("posts", &untitled).await?), vec![4]);

    // Unknown fields match nothing.
    let unknown = QueryOptions::parse(r#"{"where": [["nope", "=", 1]]}"#)?;
    assert!(driver.get_docs("posts", &unknown).await?.is_empty());

    // Temporal columns compare as text.
    let recent = QueryOptions::parse(r#"{"where": [["published_at", ">", "2024-01-15"]]}"#)?;
    assert_eq!(ids(&driver.get_docs("posts", &recent).await?), vec![3]);

    // Ties on the order field fall back to the primary key.
    let by_views = QueryOptions::parse(r#"{"order": ["views", "desc"], "limit": 3}"#)?;
    assert_eq!(ids(&driver.get_docs("posts", &by_views).await?), vec![4, 2, 1]);

    let mut page_options = PageOptions::parse(r#"{"page_size": 2, "order": ["views", "asc"]}"#)?;
    let mut seen = Vec::new();
    loop {
        let page = driver.get_page("posts", &page_options).await?;
        let again = driver.get_page("posts", &page_options).await?;
        assert_eq!(page, again);
        assert_eq!(page.total, 5);
        seen.extend(ids(&page.records));
        match page.next_cursor {
            Some(cursor) => page_options.cursor = Some(cursor),
            None => break,
        }
    }
    assert_eq!(seen, vec![5, 1, 3, 2, 4]);

    assert!(matches!(
        driver.get_docs("missing", &QueryOptions::all()).await,
        Err(AcsysError::InvalidQuery { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_mysql_integration_describe_and_locks() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&database_url, 30).await?;
    seed(&database_url).await;

    let driver = MySqlDriver::new(&database_url).await?;
    driver.initialize().await?;

    let fields = driver.describe_table("posts").await?;
    let kinds: Vec<(&str, FieldKind)> = fields.iter().map(|f| (f.name.as_str(), f.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("id", FieldKind::Integer),
            ("title", FieldKind::Text),
            ("views", FieldKind::Integer),
            ("featured", FieldKind::Boolean),
            ("published_at", FieldKind::Temporal),
        ]
    );
    assert!(fields[0].is_primary_key);
    assert_eq!(driver.get_table_size("posts").await?, 5);

    assert!(!driver.check_open_table("posts").await?);
    driver.set_table_lock("posts", LockState::Unlocked).await?;
    driver.set_table_lock("posts", LockState::Unlocked).await?;
    assert!(driver.check_open_table("posts").await?);
    driver.set_table_lock("posts", LockState::Locked).await?;
    assert!(!driver.check_open_table("posts").await?);

    let filter = QueryOptions::parse(r#"{"where": [["views", "=", 5]]}"#)?;
    let mut changes = Record::new();
    changes.insert("views".to_string(), Value::from(6));
    assert_eq!(driver.update_docs("posts", &filter, &changes).await?, 2);
    assert_eq!(driver.delete_docs("posts", &filter).await?, 0);

    driver.close().await;
    Ok(())
}
