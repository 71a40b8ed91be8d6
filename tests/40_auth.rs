mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use common::AuthFixture;
use docgate::auth::{
    register_permissions, spawn_permission_bootstrap, AuthSettings, AuthorizationCenter, PermissionDefault, TokenCodec,
};
use docgate::cache::KeyValueCache;

#[tokio::test]
async fn live_token_resolves_to_session() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    let token = fx.login("ann", &["editor"], &["g1", "g2"]).await?;

    let identity = fx.center.resolve_identity(Some(&token)).await?;
    assert_eq!(identity.user_name, "ann");
    assert_eq!(identity.real_name, "Real Name");

    let session = fx.center.load_session(identity).await?;
    assert_eq!(session.role_names, ["editor"]);
    assert_eq!(session.group_list, ["g1", "g2"]);
    Ok(())
}

#[tokio::test]
async fn replaced_or_missing_sessions_are_rejected() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    let token = fx.login("ann", &[], &[]).await?;
    let identity = fx.center.resolve_identity(Some(&token)).await?;

    // a newer login replaces the cached subject
    fx.cache.set(&identity.token_id, "someone--else--entirely", None).await?;
    let err = fx.center.resolve_identity(Some(&token)).await.unwrap_err();
    assert_eq!(err.status_code(), 401);

    fx.cache.delete(&[identity.token_id.as_str()]).await?;
    let err = fx.center.resolve_identity(Some(&token)).await.unwrap_err();
    assert_eq!(err.status_code(), 401);

    for bad in [None, Some(""), Some("garbage")] {
        let err = fx.center.resolve_identity(bad).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    let foreign = TokenCodec::new("other-secret", 600).encode(&TokenCodec::subject("x", "y", "z"))?;
    let err = fx.center.resolve_identity(Some(&foreign)).await.unwrap_err();
    assert_eq!(err.status_code(), 401);
    Ok(())
}

#[tokio::test]
async fn missing_cache_is_a_server_error() -> Result<()> {
    let center = AuthorizationCenter::new(common::settings());
    let err = center.resolve_identity(Some("anything")).await.unwrap_err();
    assert_eq!(err.status_code(), 500);
    Ok(())
}

#[tokio::test]
async fn role_permissions_are_merged() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    fx.grant("reader", "library", "books", json!([1, 2]), true).await?;
    fx.grant("writer", "library", "books", json!([2, 4]), false).await?;
    fx.grant("writer", "library", "loans", json!([8]), true).await?;
    let token = fx.login("ann", &["reader", "writer"], &["g1"]).await?;

    let identity = fx.center.resolve_identity(Some(&token)).await?;
    let session = fx.center.load_session(identity).await?;

    let grant = fx.center.resolve_permissions(&session, "library", "books").await?;
    assert_eq!(grant.permission_list, BTreeSet::from([1, 2, 4]));
    assert!(!grant.is_all_data);

    let grant = fx.center.resolve_permissions(&session, "library", "loans").await?;
    assert_eq!(grant.permission_list, BTreeSet::from([8]));
    assert!(grant.is_all_data);
    Ok(())
}

#[tokio::test]
async fn no_access_is_forbidden_when_proxied() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    fx.grant("guest", "library", "books", json!([0]), false).await?;
    let token = fx.login("ann", &["guest"], &["g1"]).await?;
    let session = fx
        .center
        .load_session(fx.center.resolve_identity(Some(&token)).await?)
        .await?;

    let err = fx.center.resolve_permissions(&session, "library", "books").await.unwrap_err();
    assert_eq!(err.status_code(), 403);
    let err = fx.center.resolve_permissions(&session, "library", "vaults").await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    let lenient = AuthFixture::new(AuthSettings { proxy_none_response: false, ..common::settings() });
    lenient.grant("guest", "library", "books", json!([0]), false).await?;
    let token = lenient.login("ann", &["guest"], &["g1"]).await?;
    let session = lenient
        .center
        .load_session(lenient.center.resolve_identity(Some(&token)).await?)
        .await?;
    let grant = lenient.center.resolve_permissions(&session, "library", "books").await?;
    assert_eq!(grant.permission_list, BTreeSet::from([0]));
    Ok(())
}

#[tokio::test]
async fn data_visibility_filters() -> Result<()> {
    let center = AuthorizationCenter::new(AuthSettings {
        admin_users: vec!["root".to_string()],
        ..common::settings()
    });

    let err = center.filter_verify(&[], true, "ann", "creator").unwrap_err();
    assert_eq!(err.status_code(), 403);

    let filter = center.filter_verify(&["g1".to_string()], false, "ann", "creator")?;
    assert_eq!(
        filter.to_json(),
        json!({"group_list": {"$elemMatch": {"$in": ["g1"]}}, "creator": "ann"})
    );

    let filter = center.filter_verify(&["g1".to_string()], true, "ann", "creator")?;
    assert!(!filter.contains("creator"));

    assert!(center.filter_verify(&[], true, "root", "creator")?.is_empty());
    Ok(())
}

#[tokio::test]
async fn debug_mode_skips_every_check() -> Result<()> {
    let center = AuthorizationCenter::new(AuthSettings { debug: true, ..AuthSettings::default() });
    let identity = center.resolve_identity(None).await?;
    assert_eq!(identity.user_name, "tmp_use");
    let session = center.load_session(identity).await?;
    let grant = center.resolve_permissions(&session, "any", "thing").await?;
    assert!(grant.is_all_data);
    assert!(grant.allows(32));
    Ok(())
}

#[tokio::test]
async fn permission_registration_is_idempotent() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    let defaults = vec![
        PermissionDefault {
            center_name: "library".into(),
            permission_name: "books".into(),
            status: vec![1, 2, 4],
            session_key: "books".into(),
        },
        PermissionDefault {
            center_name: "library".into(),
            permission_name: "loans".into(),
            status: vec![1],
            session_key: "loans".into(),
        },
    ];

    let report = register_permissions(&fx.center, &defaults).await?;
    assert_eq!(report.permissions_created, 2);
    assert_eq!(report.permission_sets_created, 4);

    let report = register_permissions(&fx.center, &defaults).await?;
    assert_eq!(report.permissions_created, 0);
    assert_eq!(report.permission_sets_created, 0);

    let books = fx.permissions.find(&json!({"permission_name": "books"}), false).await?;
    let sets = fx
        .permission_sets
        .find(&json!({"permission_id": books[0]["id"]}), true)
        .await?;
    assert_eq!(sets.len(), 3);
    Ok(())
}

#[tokio::test]
async fn spawned_bootstrap_registers_after_delay() -> Result<()> {
    let fx = AuthFixture::new(AuthSettings { bootstrap_delay: Duration::from_millis(10), ..common::settings() });
    let defaults = vec![PermissionDefault {
        center_name: "library".into(),
        permission_name: "books".into(),
        status: vec![1],
        session_key: "books".into(),
    }];

    spawn_permission_bootstrap(fx.center.clone(), defaults.clone()).await?;
    assert!(fx.permissions.exists(&json!({"permission_name": "books"})).await?);
    assert!(fx.permission_sets.exists(&json!({"permission_status": 1})).await?);

    let debug = AuthFixture::new(AuthSettings { debug: true, ..common::settings() });
    spawn_permission_bootstrap(debug.center.clone(), defaults).await?;
    assert!(!debug.permissions.exists(&json!({})).await?);
    Ok(())
}

#[tokio::test]
async fn real_names_may_contain_the_separator() -> Result<()> {
    let fx = AuthFixture::new(common::settings());
    let id = fx.users.insert(&json!({"user_name": "ann", "role_name": [], "group_name": []})).await?;
    let subject = TokenCodec::subject(&id, "ann", "Ann--Marie");
    fx.cache.set(&id, &subject, None).await?;
    let token = TokenCodec::new(common::SECRET, 600).encode(&subject)?;

    let identity = fx.center.resolve_identity(Some(&token)).await?;
    assert_eq!(identity.user_name, "ann");
    assert_eq!(identity.real_name, "Ann--Marie");

    let short = TokenCodec::new(common::SECRET, 600).encode(&format!("{}--ann", id))?;
    assert_eq!(fx.center.resolve_identity(Some(&short)).await.unwrap_err().status_code(), 401);
    Ok(())
}
