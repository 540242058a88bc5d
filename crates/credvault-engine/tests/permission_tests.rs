//! Access control entries when enforcement is on

mod common;

use common::{caller, Harness};
use credvault_core::types::{OperationCode, PermissionOperation};
use credvault_engine::PermissionGrant;
use serde_json::json;

async fn owned_by_alice(h: &Harness) {
    h.service
        .store(
            &caller("alice"),
            &json!({"name": "/team/db", "type": "value", "value": "secret"}),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_creator_becomes_owner() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;

    let entries = h.service.permissions(&caller("alice"), "/team/db").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, "alice");
    for op in PermissionOperation::ALL {
        assert!(entries[0].allows(op));
    }
}

#[tokio::test]
async fn test_other_actors_see_not_found() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;
    let bob = caller("bob");

    let err = h.service.fetch_by_name(&bob, "/team/db").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = h.service.delete(&bob, "/team/db").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = h
        .service
        .store(
            &bob,
            &json!({"name": "/team/db", "type": "value", "value": "mine", "overwrite": true}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    assert!(h.service.find_names_like(&bob, "db").await.unwrap().is_empty());
    assert!(h.service.find_paths(&bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_granted_read_allows_fetch_only() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;
    let alice = caller("alice");
    let bob = caller("bob");

    h.service
        .add_permissions(
            &alice,
            "/team/db",
            vec![PermissionGrant {
                actor: "bob".into(),
                operations: vec![PermissionOperation::Read],
            }],
        )
        .await
        .unwrap();

    assert_eq!(
        h.service.fetch_by_name(&bob, "/team/db").await.unwrap().value,
        json!("secret")
    );
    assert_eq!(h.service.find_paths(&bob).await.unwrap(), vec!["/team/", "/team/db"]);
    assert!(h.service.delete(&bob, "/team/db").await.is_err());
    assert!(h.service.permissions(&bob, "/team/db").await.is_err());
}

#[tokio::test]
async fn test_grants_are_merged() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;
    let alice = caller("alice");

    for op in [PermissionOperation::Read, PermissionOperation::Write] {
        h.service
            .add_permissions(
                &alice,
                "/team/db",
                vec![PermissionGrant {
                    actor: "bob".into(),
                    operations: vec![op],
                }],
            )
            .await
            .unwrap();
    }

    let entries = h.service.permissions(&alice, "/team/db").await.unwrap();
    let bob = entries.iter().find(|e| e.actor == "bob").unwrap();
    assert!(bob.allows(PermissionOperation::Read));
    assert!(bob.allows(PermissionOperation::Write));
    assert!(!bob.allows(PermissionOperation::Delete));
}

#[tokio::test]
async fn test_delete_permission() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;
    let alice = caller("alice");
    h.service
        .add_permissions(
            &alice,
            "/team/db",
            vec![PermissionGrant {
                actor: "bob".into(),
                operations: vec![PermissionOperation::Read],
            }],
        )
        .await
        .unwrap();

    h.service
        .delete_permission(&alice, "/team/db", "bob")
        .await
        .unwrap();
    assert!(h.service.fetch_by_name(&caller("bob"), "/team/db").await.is_err());

    let err = h
        .service
        .delete_permission(&alice, "/team/db", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    let acl_ops: Vec<_> = h
        .audit()
        .await
        .into_iter()
        .filter(|r| r.operation == OperationCode::AclDelete)
        .map(|r| r.status_code)
        .collect();
    assert_eq!(acl_ops, vec![200, 404]);
}

#[tokio::test]
async fn test_invalid_grants_are_rejected() {
    let h = Harness::enforcing().await;
    owned_by_alice(&h).await;
    let err = h
        .service
        .add_permissions(
            &caller("alice"),
            "/team/db",
            vec![PermissionGrant {
                actor: "bob".into(),
                operations: vec![],
            }],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_permissions_on_missing_credential() {
    let h = Harness::enforcing().await;
    let err = h
        .service
        .permissions(&caller("alice"), "/nothing")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_signing_requires_read_on_the_ca() {
    let h = Harness::enforcing().await;
    h.service
        .store(
            &caller("alice"),
            &json!({"name": "/alice/ca", "type": "root", "parameters": {"common_name": "Alice CA"}}),
        )
        .await
        .unwrap();

    let err = h
        .service
        .store(
            &caller("bob"),
            &json!({"name": "/bob/leaf", "type": "certificate", "parameters": {"common_name": "b", "ca": "/alice/ca"}}),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("CA not found"));
}
