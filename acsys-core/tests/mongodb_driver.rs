//! MongoDB driver integration tests using testcontainers.

#![cfg(feature = "mongodb")]

use acsys_core::drivers::mongodb::MongoDriver;
use acsys_core::{
    AcsysError, DataDriver, FieldKind, LockState, PageOptions, QueryOptions, Record, Result,
    models::{OPEN_TABLES_TABLE, USERS_TABLE},
};
use mongodb::bson::{Bson, doc};
use serde_json::Value;
use testcontainers_modules::mongo::Mongo;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

/// Helper to set up test data in MongoDB
async fn setup_test_data(connection_string: &str) {
    let client = mongodb::Client::with_uri_str(connection_string)
        .await
        .unwrap();
    let posts = client
        .database("acsys")
        .collection::<mongodb::bson::Document>("posts");

    posts
        .insert_many(vec![
            doc! { "n": 1, "title": "alpha", "views": 5 },
            doc! { "n": 2, "title": "5", "views": 10 },
            doc! { "n": 3, "title": "gamma", "views": 5 },
            doc! { "n": 4, "title": Bson::Null, "views": 20 },
            doc! { "n": 5, "views": 1 },
        ])
        .await
        .unwrap();
}

fn numbers(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("n").and_then(Value::as_i64))
        .collect()
}

#[tokio::test]
async fn test_mongodb_integration_driver_semantics() -> Result<()> {
    let container = Mongo::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let connection_string = format!("mongodb://localhost:{}/acsys", port);

    setup_test_data(&connection_string).await;

    let driver = MongoDriver::new(&connection_string).await?;
    driver.initialize().await?;
    driver.initialize().await?;

    let names = driver.table_names().await?;
    assert!(names.contains(&USERS_TABLE.to_string()));
    assert!(names.contains(&OPEN_TABLES_TABLE.to_string()));
    assert!(names.contains(&"posts".to_string()));

    // No coercion between text and numbers.
    let text_five = QueryOptions::parse(r#"{"where": [["title", "=", "5"]]}"#)?;
    assert_eq!(numbers(&driver.get_docs("posts", &text_five).await?), vec![2]);
    let number_five = QueryOptions::parse(r#"{"where": [["title", "=", 5]]}"#)?;
    assert!(driver.get_docs("posts", &number_five).await?.is_empty());

    // Filters require the field to exist.
    let not_alpha = QueryOptions::parse(
        r#"{"where": [["title", "!=", "alpha"]], "order": ["n", "asc"]}"#,
    )?;
    assert_eq!(numbers(&driver.get_docs("posts", &not_alpha).await?), vec![2, 3, 4]);

    let by_views = QueryOptions::parse(r#"{"order": ["views", "desc"], "limit": 2}"#)?;
    assert_eq!(numbers(&driver.get_docs("posts", &by_views).await?), vec![4, 2]);

    // Ties on views are broken by _id, so repeated reads return the same slice.
    let mut page_options = PageOptions::parse(r#"{"page_size": 2, "order": ["views", "asc"]}"#)?;
    let mut seen = Vec::new();
    loop {
        let page = driver.get_page("posts", &page_options).await?;
        let again = driver.get_page("posts", &page_options).await?;
        assert_eq!(page, again);
        assert_eq!(page.total, 5);
        seen.extend(numbers(&page.records));
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
async fn test_mongodb_integration_arrays_and_dates() -> Result<()> {
    let container = Mongo::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let connection_string = format!("mongodb://localhost:{}/acsys", port);

    setup_test_data(&connection_string).await;

    let client = mongodb::Client::with_uri_str(&connection_string)
        .await
        .unwrap();
    let published = mongodb::bson::DateTime::parse_rfc3339_str("2024-02-01T10:00:00Z").unwrap();
    client
        .database("acsys")
        .collection::<mongodb::bson::Document>("events")
        .insert_many(vec![
            doc! { "n": 1, "at": published },
            doc! { "n": 2, "at": "2024-02-01T10:00:00Z" },
            doc! { "n": 3, "at": Bson::Null },
        ])
        .await
        .unwrap();

    let driver = MongoDriver::new(&connection_string).await?;
    driver.initialize().await?;

    // Arrays never equal a scalar and always differ from one.
    let mut tagged = Record::new();
    tagged.insert("n".to_string(), Value::from(6));
    tagged.insert("tags".to_string(), serde_json::json!(["a", "b"]));
    driver.insert_doc("posts", &tagged).await?;
    let mut plain = Record::new();
    plain.insert("n".to_string(), Value::from(7));
    plain.insert("tags".to_string(), Value::from("a"));
    driver.insert_doc("posts", &plain).await?;

    let is_a = QueryOptions::parse(r#"{"where": [["tags", "=", "a"]]}"#)?;
    assert_eq!(numbers(&driver.get_docs("posts", &is_a).await?), vec![7]);
    let not_a = QueryOptions::parse(r#"{"where": [["tags", "!=", "a"]]}"#)?;
    assert_eq!(numbers(&driver.get_docs("posts", &not_a).await?), vec![6]);

    // Dates read back as RFC 3339 text and can be filtered with that text.
    let stored = driver
        .get_docs("events", &QueryOptions::parse(r#"{"where": [["n", "=", 1]]}"#)?)
        .await?;
    let text = stored[0].get("at").and_then(Value::as_str).unwrap().to_string();
    let same = QueryOptions::all()
        .with_filter("at", acsys_core::Operator::Eq, text.as_str())
        .with_order(acsys_core::OrderBy::asc("n"));
    assert_eq!(numbers(&driver.get_docs("events", &same).await?), vec![1, 2]);

    let other = QueryOptions::parse(
        r#"{"where": [["at", "!=", "2024-02-01T10:00:00Z"]], "order": ["n", "asc"]}"#,
    )?;
    assert_eq!(numbers(&driver.get_docs("events", &other).await?), vec![3]);

    let later = QueryOptions::parse(r#"{"where": [["at", ">", "2024-01-01T00:00:00Z"]], "order": ["n", "asc"]}"#)?;
    assert_eq!(numbers(&driver.get_docs("events", &later).await?), vec![1, 2]);

    Ok(())
}

#[tokio::test]
async fn test_mongodb_integration_writes_and_locks() -> Result<()> {
    let container = Mongo::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let connection_string = format!("mongodb://localhost:{}/acsys", port);

    setup_test_data(&connection_string).await;

    let driver = MongoDriver::new(&connection_string).await?;
    driver.initialize().await?;

    let fields = driver.describe_table("posts").await?;
    let id = fields.iter().find(|f| f.name == "_id").unwrap();
    assert!(id.is_primary_key);
    let views = fields.iter().find(|f| f.name == "views").unwrap();
    assert_eq!(views.kind, FieldKind::Integer);

    assert_eq!(driver.get_table_size("posts").await?, 5);

    let filter = QueryOptions::parse(r#"{"where": [["views", "=", 5]]}"#)?;
    let mut changes = Record::new();
    changes.insert("views".to_string(), Value::from(6));
    assert_eq!(driver.update_docs("posts", &filter, &changes).await?, 2);
    assert_eq!(driver.delete_docs("posts", &filter).await?, 0);

    // Identifiers round-trip as hex strings.
    let first = driver
        .get_docs("posts", &QueryOptions::parse(r#"{"where": [["n", "=", 1]]}"#)?)
        .await?;
    let hex = first[0].get("_id").and_then(Value::as_str).unwrap().to_string();
    let by_id = QueryOptions::all().with_filter("_id", acsys_core::Operator::Eq, hex.as_str());
    assert_eq!(numbers(&driver.get_docs("posts", &by_id).await?), vec![1]);

    driver.set_table_lock("posts", LockState::Unlocked).await?;
    assert!(driver.check_open_table("posts").await?);
    driver.set_table_lock("posts", LockState::Locked).await?;
    assert!(!driver.check_open_table("posts").await?);

    Ok(())
}
