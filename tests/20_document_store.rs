mod common;

use anyhow::Result;
use serde_json::json;

#[tokio::test]
async fn inserted_documents_come_back_external() -> Result<()> {
    let store = common::store("books");
    let id = store.insert(&json!({"title": "Dune", "pages": 412})).await?;

    let doc = store.find_by_id(&json!(id), true).await?.expect("document");
    assert_eq!(doc["id"], json!(id));
    assert_eq!(doc["title"], "Dune");
    assert!(doc["creation_time"].is_i64());
    assert!(doc["update_time"].is_i64());
    assert!(!doc.contains_key("remove_time") || doc["remove_time"].is_null());
    Ok(())
}

#[tokio::test]
async fn find_by_id_missing_and_malformed() -> Result<()> {
    let store = common::store("books");
    let absent = "5f1d7f0e-0000-4000-8000-000000000000";

    assert!(store.find_by_id(&json!(absent), false).await?.is_none());
    let err = store.find_by_id(&json!(absent), true).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    for raise in [false, true] {
        let err = store.find_by_id(&json!("not-an-id"), raise).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
    let err = store.find_by_id(&json!(12), false).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    Ok(())
}

#[tokio::test]
async fn soft_deleted_documents_are_hidden() -> Result<()> {
    let store = common::store("books");
    let keep = store.insert(&json!({"title": "keep", "shelf": 1})).await?;
    let gone = store.insert(&json!({"title": "gone", "shelf": 1})).await?;

    let outcome = store.delete(&json!({"id": gone}), false, true).await?;
    assert_eq!(outcome.deleted_count, 1);
    assert!(outcome.soft_delete);
    assert_eq!(serde_json::to_value(outcome)?["false_delete"], json!(true));

    let found = store.find(&json!({"shelf": 1}), true).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], json!(keep));
    assert!(store.find_by_id(&json!(gone), false).await?.is_none());

    let updated = store.update(&json!({"id": gone}), &json!({"title": "revived"}), false).await?;
    assert_eq!(updated.matched_count, 0);

    let hard = store.delete(&json!({"id": gone}), false, false).await?;
    assert_eq!(hard.deleted_count, 0);

    // still present, only hidden
    assert!(store.exists(&json!({"id": gone})).await?);
    let removed = store.find(&json!({"id": gone, "remove_time": {"$exists": true}}), false).await?;
    assert_eq!(removed.len(), 1);
    assert!(removed[0]["remove_time"].is_i64());
    Ok(())
}

#[tokio::test]
async fn update_and_increment() -> Result<()> {
    let store = common::store("counters");
    let a = store.insert(&json!({"name": "a", "hits": 1})).await?;
    store.insert(&json!({"name": "b", "hits": 5})).await?;

    let before = store.find_by_id(&json!(a), true).await?.expect("document");
    let outcome = store.update(&json!({"name": "a"}), &json!({"label": "first"}), false).await?;
    assert_eq!((outcome.matched_count, outcome.modified_count), (1, 1));
    let after = store.find_by_id(&json!(a), true).await?.expect("document");
    assert_eq!(after["label"], "first");
    assert!(after["update_time"].as_i64() >= before["update_time"].as_i64());

    let outcome = store.update_increment(&json!({}), &json!({"hits": 2}), true).await?;
    assert_eq!(outcome.matched_count, 2);
    let docs = store.find(&json!({"hits": {"$gte": 3}}), true).await?;
    assert_eq!(docs.len(), 2);

    let err = store.update(&json!({}), &json!(["no"]), true).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    Ok(())
}

#[tokio::test]
async fn batch_insert_and_lookup_by_ids() -> Result<()> {
    let store = common::store("tags");
    let ids = store
        .insert_many(&json!([{"tag": "red"}, {"tag": "blue"}, {"tag": "red"}]))
        .await?;
    assert_eq!(ids.len(), 3);

    let docs = store.find_by_ids(&json!([ids[0], ids[2]])).await?;
    assert_eq!(docs.len(), 2);
    assert!(store.find_by_ids(&json!([])).await?.is_empty());
    assert_eq!(store.find_by_ids(&json!("x")).await.unwrap_err().status_code(), 400);

    assert_eq!(store.find_distinct_count("tag").await?, 2);

    let err = store.insert_many(&json!([{"tag": "ok"}, 3])).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    let err = store.insert(&json!("text")).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    Ok(())
}

#[tokio::test]
async fn filter_operators_on_documents() -> Result<()> {
    let store = common::store("people");
    store
        .insert_many(&json!([
            {"name": "ann", "age": 31, "tags": ["x", "y"]},
            {"name": "bob", "age": 25, "tags": ["z"]},
            {"name": "cid", "age": 40}
        ]))
        .await?;

    assert_eq!(store.find(&json!({"age": {"$gt": 30}}), true).await?.len(), 2);
    assert_eq!(store.find(&json!({"name": {"$in": ["ann", "cid"]}}), true).await?.len(), 2);
    assert_eq!(store.find(&json!({"tags": "z"}), true).await?.len(), 1);
    assert_eq!(store.find(&json!({"tags": {"$exists": false}}), true).await?.len(), 1);
    assert_eq!(store.find(&json!({"name": {"$regex": "^b"}}), true).await?.len(), 1);
    assert_eq!(store.find(&json!({}), false).await?.len(), 1);

    let err = store.find(&json!({"age": {"$near": 3}}), true).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    Ok(())
}
