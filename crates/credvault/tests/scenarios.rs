//! End-to-end scenarios over a wired vault.
//!
//! Each test drives the public services the way an API layer would: build a
//! request, call the service as some actor, inspect what came back and what
//! was stored.

use credvault::config::{EncryptionConfig, KeyConfig};
use credvault::core::{CredentialValue, PasswordParameters};
use credvault::error::TOO_MANY_TRANSITIONAL_VERSIONS;
use credvault::pki::CertificateReader;
use credvault::store::SqliteStore;
use credvault::{
    CredentialVersion, GenerateRequest, GenerationParameters, PermissionEntry,
    PermissionOperation, SetRequest, Vault, VaultConfig, VaultError, WriteMode,
};
use credvault_testkit::{TestVault, ADMIN};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn fixture() -> TestVault {
    init_tracing();
    let fixture = TestVault::new();
    fixture.grant_admin_everything().await;
    fixture
}

fn generate(body: serde_json::Value) -> GenerateRequest {
    GenerateRequest::from_json_value(body).unwrap()
}

fn certificate(version: &CredentialVersion) -> CertificateReader {
    CertificateReader::from_pem(&version.as_certificate().unwrap().certificate).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_then_read_back() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let request = SetRequest::new("app/db", CredentialValue::Value("s3cret".into())).unwrap();
    let written = credentials.set(&ctx, request).await.unwrap();
    assert_eq!(written.name(), "/app/db");

    let found = credentials.find_by_name(&ctx, "/app/db", None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), written.id());
    assert_eq!(
        credentials.reveal(&found[0]).unwrap(),
        CredentialValue::Value("s3cret".into())
    );

    let by_id = credentials.find_by_id(&ctx, &written.id()).await.unwrap();
    assert_eq!(by_id.name(), "/app/db");
}

#[tokio::test]
async fn test_versions_are_newest_first() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    for value in ["one", "two", "three"] {
        let request = SetRequest::new("/rotating", CredentialValue::Password(value.into())).unwrap();
        credentials.set(&ctx, request).await.unwrap();
    }

    let all = credentials.find_by_name(&ctx, "/rotating", None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(
        credentials.reveal(&all[0]).unwrap(),
        CredentialValue::Password("three".into())
    );
    // Every version belongs to the same credential
    assert!(all.iter().all(|v| v.credential().id == all[0].credential().id));

    let newest = credentials.find_by_name(&ctx, "/rotating", Some(1)).await.unwrap();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].id(), all[0].id());
}

#[tokio::test]
async fn test_creator_is_granted_access() {
    let fixture = fixture().await;
    fixture
        .grant("/team/*", "uaa-user:alice", &[PermissionOperation::Write])
        .await;
    let alice = credvault::RequestContext::for_actor("uaa-user:alice");

    let request = SetRequest::new("/team/token", CredentialValue::Value("t".into())).unwrap();
    fixture.vault.credentials().set(&alice, request).await.unwrap();

    // Alice held only write on the wildcard; reading works through the
    // creator grant on the exact name
    let found = fixture
        .vault
        .credentials()
        .find_by_name(&alice, "/team/token", None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let rows = fixture
        .vault
        .get_permissions(&fixture.admin(), "/team/token")
        .await
        .unwrap();
    assert!(rows.iter().any(|row| row.actor == "uaa-user:alice"));
}

#[tokio::test]
async fn test_missing_and_forbidden_look_the_same() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();

    let request = SetRequest::new("/secret", CredentialValue::Value("x".into())).unwrap();
    credentials.set(&fixture.admin(), request).await.unwrap();

    let (bob, _) = fixture.ctx("uaa-user:bob");
    let forbidden = credentials.find_by_name(&bob, "/secret", None).await.unwrap_err();
    let missing = credentials
        .find_by_name(&fixture.admin(), "/does-not-exist", None)
        .await
        .unwrap_err();

    assert!(matches!(forbidden, VaultError::NotFoundOrForbidden));
    assert!(matches!(missing, VaultError::NotFoundOrForbidden));
    assert_eq!(forbidden.to_string(), missing.to_string());
}

#[tokio::test]
async fn test_find_paths_filters_by_read() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    for name in ["/svc/a", "/svc/b", "/svcx/c", "/other/d"] {
        let request = SetRequest::new(name, CredentialValue::Value("v".into())).unwrap();
        credentials.set(&ctx, request).await.unwrap();
    }

    let mut names: Vec<_> = credentials
        .find_paths(&ctx, "/svc")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["/svc/a", "/svc/b"]);

    fixture
        .grant("/svc/a", "uaa-user:carol", &[PermissionOperation::Read])
        .await;
    let carol = credvault::RequestContext::for_actor("uaa-user:carol");
    let visible = credentials.find_containing(&carol, "svc").await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "/svc/a");
}

#[tokio::test]
async fn test_delete_removes_versions_and_permissions() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let request = SetRequest::new("/doomed", CredentialValue::Value("v".into())).unwrap();
    credentials.set(&ctx, request).await.unwrap();
    fixture
        .grant("/doomed", "uaa-user:dave", &[PermissionOperation::Read])
        .await;

    credentials.delete(&ctx, "/doomed").await.unwrap();

    let err = credentials.find_by_name(&ctx, "/doomed", None).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));
    let rows = fixture.vault.get_permissions(&ctx, "/doomed").await.unwrap();
    assert!(rows.is_empty());

    let again = credentials.delete(&ctx, "/doomed").await.unwrap_err();
    assert!(matches!(again, VaultError::NotFoundOrForbidden));
}

#[tokio::test]
async fn test_request_audit_records_touched_versions() {
    let fixture = fixture().await;
    let (ctx, audit) = fixture.ctx(ADMIN);

    let request = SetRequest::new("/audited", CredentialValue::Value("v".into())).unwrap();
    let version = fixture.vault.credentials().set(&ctx, request).await.unwrap();

    let resources = audit.resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].name, "/audited");
    assert_eq!(audit.versions(), vec![version.id()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_password_generation_converges() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let first = credentials
        .generate(
            &ctx,
            generate(json!({"name": "/pw", "type": "password", "parameters": {"length": 20}})),
        )
        .await
        .unwrap();
    let CredentialValue::Password(password) = credentials.reveal(&first).unwrap() else {
        panic!("expected a password");
    };
    assert_eq!(password.len(), 20);

    // No parameters: no opinion, keep what is there
    let kept = credentials
        .generate(&ctx, generate(json!({"name": "/pw", "type": "password"})))
        .await
        .unwrap();
    assert_eq!(kept.id(), first.id());

    // Same parameters: still converged
    let same = credentials
        .generate(
            &ctx,
            generate(json!({"name": "/pw", "type": "password", "parameters": {"length": 20}})),
        )
        .await
        .unwrap();
    assert_eq!(same.id(), first.id());

    // Different parameters mint a new version
    let longer = credentials
        .generate(
            &ctx,
            generate(json!({"name": "/pw", "type": "password", "parameters": {"length": 30}})),
        )
        .await
        .unwrap();
    assert_ne!(longer.id(), first.id());

    let all = credentials.find_by_name(&ctx, "/pw", None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_write_modes() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();
    let params = GenerationParameters::Password(PasswordParameters::with_length(24));

    let first = credentials
        .generate(
            &ctx,
            GenerateRequest::new("/modes", params.clone(), WriteMode::NoOverwrite).unwrap(),
        )
        .await
        .unwrap();

    let kept = credentials
        .generate(
            &ctx,
            GenerateRequest::new("/modes", params.clone(), WriteMode::NoOverwrite).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(kept.id(), first.id());

    let replaced = credentials
        .generate(
            &ctx,
            GenerateRequest::new("/modes", params, WriteMode::Overwrite).unwrap(),
        )
        .await
        .unwrap();
    assert_ne!(replaced.id(), first.id());
}

#[tokio::test]
async fn test_overwrite_flag_and_mode_conflict() {
    let err = GenerateRequest::from_json_value(json!({
        "name": "/x",
        "type": "password",
        "mode": "converge",
        "overwrite": true,
    }))
    .unwrap_err();
    assert_eq!(err.code, "error.overwrite_and_mode_both_provided");
}

#[tokio::test]
async fn test_generate_with_different_type_is_rejected() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let request = SetRequest::new("/typed", CredentialValue::Value("v".into())).unwrap();
    credentials.set(&ctx, request).await.unwrap();

    let err = credentials
        .generate(&ctx, generate(json!({"name": "/typed", "type": "password"})))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Validation(v) if v.code == "error.type_mismatch"));
}

#[tokio::test]
async fn test_user_generation_keeps_username() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let version = credentials
        .generate(
            &ctx,
            generate(json!({
                "name": "/svc-user",
                "type": "user",
                "value": {"username": "svc"},
            })),
        )
        .await
        .unwrap();
    let CredentialValue::User(user) = credentials.reveal(&version).unwrap() else {
        panic!("expected a user");
    };
    assert_eq!(user.username.as_deref(), Some("svc"));
    assert!(!user.password.is_empty());
}

#[tokio::test]
async fn test_regenerate_reuses_stored_parameters() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let first = credentials
        .generate(
            &ctx,
            generate(json!({
                "name": "/hex",
                "type": "password",
                "parameters": {"length": 40, "only_hex": true},
            })),
        )
        .await
        .unwrap();
    let second = credentials.regenerate(&ctx, "/hex").await.unwrap();
    assert_ne!(second.id(), first.id());

    let CredentialValue::Password(password) = credentials.reveal(&second).unwrap() else {
        panic!("expected a password");
    };
    assert_eq!(password.len(), 40);
    assert!(password.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_set_values_cannot_be_regenerated() {
    let fixture = fixture().await;
    let credentials = fixture.vault.credentials();
    let ctx = fixture.admin();

    let request = SetRequest::new("/plain", CredentialValue::Value("v".into())).unwrap();
    credentials.set(&ctx, request).await.unwrap();
    let err = credentials.regenerate(&ctx, "/plain").await.unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_actor_cannot_grant_itself() {
    let fixture = fixture().await;
    let ctx = fixture.admin();

    let request = SetRequest::new("/x", CredentialValue::Value("v".into())).unwrap();
    fixture.vault.credentials().set(&ctx, request).await.unwrap();

    let alice = "uaa-user:alice";
    fixture
        .vault
        .save_permissions(
            &ctx,
            &[PermissionEntry::new("/x", alice, [PermissionOperation::Write])],
        )
        .await
        .unwrap();

    let (alice_ctx, _) = fixture.ctx(alice);
    let err = fixture
        .vault
        .save_permissions(
            &alice_ctx,
            &[PermissionEntry::new("/x", alice, [PermissionOperation::WriteAcl])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidPermissionOperation(_)));

    let rows = fixture.vault.get_permissions(&ctx, "/x").await.unwrap();
    let alice_row = rows.iter().find(|row| row.actor == alice).unwrap();
    assert!(!alice_row.operations.contains(PermissionOperation::WriteAcl));
}

#[tokio::test]
async fn test_revoke_then_read_is_forbidden() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    let erin = "uaa-user:erin";

    let request = SetRequest::new("/shared", CredentialValue::Value("v".into())).unwrap();
    fixture.vault.credentials().set(&ctx, request).await.unwrap();
    fixture
        .vault
        .save_permissions(
            &ctx,
            &[PermissionEntry::new("/shared", erin, [PermissionOperation::Read])],
        )
        .await
        .unwrap();

    let erin_ctx = credvault::RequestContext::for_actor(erin);
    fixture
        .vault
        .credentials()
        .find_by_name(&erin_ctx, "/shared", None)
        .await
        .unwrap();

    fixture
        .vault
        .revoke_operations(&ctx, "/shared", erin, &[PermissionOperation::Read])
        .await
        .unwrap();
    let err = fixture
        .vault
        .credentials()
        .find_by_name(&erin_ctx, "/shared", None)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));
}

#[tokio::test]
async fn test_stranger_cannot_open_a_wildcard_grant() {
    init_tracing();
    let fixture = TestVault::new();
    fixture.grant("/team/*", ADMIN, &PermissionOperation::ALL).await;
    let ctx = fixture.admin();

    let request = SetRequest::new("/team/secret", CredentialValue::Value("v".into())).unwrap();
    fixture.vault.credentials().set(&ctx, request).await.unwrap();

    let bob = "uaa-user:bob";
    let (mallory_ctx, _) = fixture.ctx("uaa-user:mallory");
    for path in ["*", "/*", "/team/*", "/team/secret"] {
        let err = fixture
            .vault
            .save_permissions(
                &mallory_ctx,
                &[PermissionEntry::new(path, bob, [PermissionOperation::Read])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFoundOrForbidden), "{path}");
    }

    assert!(fixture.vault.find_all_paths_by_actor(bob).await.unwrap().is_empty());
    let (bob_ctx, _) = fixture.ctx(bob);
    let err = fixture
        .vault
        .credentials()
        .find_by_name(&bob_ctx, "/team/secret", None)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));
}

// ─────────────────────────────────────────────────────────────────────────────
// Certificates
// ─────────────────────────────────────────────────────────────────────────────

async fn root_ca(fixture: &TestVault, name: &str) -> CredentialVersion {
    fixture
        .vault
        .credentials()
        .generate(
            &fixture.admin(),
            generate(json!({
                "name": name,
                "type": "certificate",
                "parameters": {"common_name": "root", "is_ca": true},
            })),
        )
        .await
        .unwrap()
}

async fn signed_leaf(fixture: &TestVault, name: &str, ca: &str) -> CredentialVersion {
    fixture
        .vault
        .credentials()
        .generate(
            &fixture.admin(),
            generate(json!({
                "name": name,
                "type": "certificate",
                "parameters": {"common_name": "leaf", "ca": ca},
            })),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ca_signed_certificate_chains_to_ca() {
    let fixture = fixture().await;
    let root = root_ca(&fixture, "/root").await;
    let leaf = signed_leaf(&fixture, "/leaf", "root").await;

    let stored = leaf.as_certificate().unwrap();
    assert_eq!(stored.ca_name.as_deref(), Some("/root"));
    assert_eq!(
        stored.ca.as_deref(),
        Some(root.as_certificate().unwrap().certificate.as_str())
    );
    assert!(!stored.certificate_authority);
    assert!(!stored.self_signed);

    let root_cert = certificate(&root);
    let leaf_cert = certificate(&leaf);
    assert!(root_cert.is_self_signed());
    assert!(leaf_cert.is_signed_by(&root_cert));
    assert_eq!(
        leaf_cert.authority_key_identifier(),
        root_cert.subject_key_identifier()
    );
}

#[tokio::test]
async fn test_converge_follows_ca_rotation() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    let credentials = fixture.vault.credentials();
    root_ca(&fixture, "/root").await;
    let leaf = signed_leaf(&fixture, "/leaf", "/root").await;

    let again = signed_leaf(&fixture, "/leaf", "/root").await;
    assert_eq!(again.id(), leaf.id());

    // A new CA key means the stored leaf no longer chains to the active CA
    let new_root = credentials.regenerate(&ctx, "/root").await.unwrap();
    let reissued = signed_leaf(&fixture, "/leaf", "/root").await;
    assert_ne!(reissued.id(), leaf.id());
    assert!(certificate(&reissued).is_signed_by(&certificate(&new_root)));
}

#[tokio::test]
async fn test_non_ca_is_indistinguishable_from_missing() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    fixture
        .vault
        .credentials()
        .generate(
            &ctx,
            generate(json!({
                "name": "/self-signed-leaf",
                "type": "certificate",
                "parameters": {"common_name": "leaf", "self_sign": true},
            })),
        )
        .await
        .unwrap();

    let authority = fixture.vault.credentials().authority();
    let not_ca = authority
        .find_active_version(ctx.actor(), "/self-signed-leaf")
        .await
        .unwrap_err();
    let missing = authority
        .find_active_version(ctx.actor(), "/nope")
        .await
        .unwrap_err();
    assert_eq!(not_ca.to_string(), missing.to_string());

    // And signing with it fails the same way
    let err = fixture
        .vault
        .credentials()
        .generate(
            &ctx,
            generate(json!({
                "name": "/child",
                "type": "certificate",
                "parameters": {"common_name": "child", "ca": "/self-signed-leaf"},
            })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));
}

#[tokio::test]
async fn test_only_one_transitional_version() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    let certificates = fixture.vault.certificates();
    let v1 = root_ca(&fixture, "/rotating-ca").await;
    let id = v1.credential().id;

    let v2 = certificates.regenerate(&ctx, "/rotating-ca", false).await.unwrap();

    let current = certificates
        .update_transitional_version(&ctx, &id, Some(&v1.id()))
        .await
        .unwrap();
    assert_eq!(current.len(), 2);
    assert!(current.iter().any(|v| v.meta.id == v1.id() && v.transitional));

    let err = certificates
        .update_transitional_version(&ctx, &id, Some(&v2.meta.id))
        .await
        .unwrap_err();
    assert!(matches!(&err, VaultError::Conflict(reason) if reason == TOO_MANY_TRANSITIONAL_VERSIONS));

    let err = certificates
        .regenerate(&ctx, "/rotating-ca", true)
        .await
        .unwrap_err();
    assert!(matches!(&err, VaultError::Conflict(reason) if reason == TOO_MANY_TRANSITIONAL_VERSIONS));

    // Clearing the flag leaves only the newest version current
    let current = certificates
        .update_transitional_version(&ctx, &id, None)
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].meta.id, v2.meta.id);
}

#[tokio::test]
async fn test_set_certificate_is_never_transitional() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    let credentials = fixture.vault.credentials();
    let root = root_ca(&fixture, "/generated-ca").await;

    let mut value = match credentials.reveal(&root).unwrap() {
        CredentialValue::Certificate(value) => value,
        other => panic!("expected a certificate, got {other:?}"),
    };
    value.transitional = true;

    let mut written = Vec::new();
    for _ in 0..2 {
        let request =
            SetRequest::new("/imported-ca", CredentialValue::Certificate(value.clone())).unwrap();
        written.push(credentials.set(&ctx, request).await.unwrap());
    }

    let id = written[0].credential().id;
    let versions = fixture
        .vault
        .certificates()
        .get_versions(&ctx, &id, false)
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions.iter().all(|v| !v.transitional));

    let active = credentials
        .authority()
        .find_active_version(ctx.actor(), "/imported-ca")
        .await
        .unwrap();
    assert_eq!(active.meta.id, written[1].id());

    // The flag can still be set explicitly, once
    fixture
        .vault
        .certificates()
        .update_transitional_version(&ctx, &id, Some(&written[0].id()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cannot_delete_last_certificate_version() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    let certificates = fixture.vault.certificates();
    let v1 = root_ca(&fixture, "/lonely").await;
    let id = v1.credential().id;

    let err = certificates.delete_version(&ctx, &id, &v1.id()).await.unwrap_err();
    assert!(matches!(err, VaultError::Validation(v) if v.code == "error.credential.cannot_delete_last_version"));

    let v2 = certificates.regenerate(&ctx, "/lonely", false).await.unwrap();
    let deleted = certificates.delete_version(&ctx, &id, &v1.id()).await.unwrap();
    assert_eq!(deleted.meta.id, v1.id());

    let remaining = certificates.get_versions(&ctx, &id, false).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].meta.id, v2.meta.id);
}

#[tokio::test]
async fn test_bulk_regenerate_walks_the_chain() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    root_ca(&fixture, "/root").await;
    let intermediate = fixture
        .vault
        .credentials()
        .generate(
            &ctx,
            generate(json!({
                "name": "/intermediate",
                "type": "certificate",
                "parameters": {"common_name": "intermediate", "is_ca": true, "ca": "/root"},
            })),
        )
        .await
        .unwrap();
    assert!(!intermediate.as_certificate().unwrap().self_signed);
    signed_leaf(&fixture, "/leaf", "/intermediate").await;

    let regenerated = fixture
        .vault
        .certificates()
        .bulk_regenerate(&ctx, "/root")
        .await
        .unwrap();
    assert_eq!(regenerated, vec!["/intermediate", "/leaf"]);

    let newest = fixture
        .vault
        .credentials()
        .find_most_recent(&ctx, "/leaf")
        .await
        .unwrap();
    let newest_intermediate = fixture
        .vault
        .credentials()
        .find_most_recent(&ctx, "/intermediate")
        .await
        .unwrap();
    assert!(certificate(&newest).is_signed_by(&certificate(&newest_intermediate)));
}

#[tokio::test]
async fn test_bulk_regenerate_needs_write_on_every_child() {
    let fixture = fixture().await;
    root_ca(&fixture, "/root").await;
    let leaf = signed_leaf(&fixture, "/leaf", "/root").await;

    let frank = "uaa-user:frank";
    fixture
        .grant("/root", frank, &[PermissionOperation::Read])
        .await;
    let frank_ctx = credvault::RequestContext::for_actor(frank);

    let err = fixture
        .vault
        .certificates()
        .bulk_regenerate(&frank_ctx, "/root")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));

    // Nothing was written
    let versions = fixture
        .vault
        .credentials()
        .find_by_name(&fixture.admin(), "/leaf", None)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].id(), leaf.id());
}

#[tokio::test]
async fn test_get_all_certificates_lists_only_certificates() {
    let fixture = fixture().await;
    let ctx = fixture.admin();
    root_ca(&fixture, "/root").await;
    let request = SetRequest::new("/not-a-cert", CredentialValue::Value("v".into())).unwrap();
    fixture.vault.credentials().set(&ctx, request).await.unwrap();

    let all = fixture.vault.certificates().get_all_certificates(&ctx).await.unwrap();
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["/root"]);

    let err = fixture
        .vault
        .certificates()
        .get_by_name(&ctx, "/not-a-cert")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFoundOrForbidden));
}

// ─────────────────────────────────────────────────────────────────────────────
// Encryption keys
// ─────────────────────────────────────────────────────────────────────────────

fn keys(keys: &[(&str, bool)]) -> EncryptionConfig {
    EncryptionConfig {
        keys: keys
            .iter()
            .map(|(password, active)| KeyConfig::new(*password, *active))
            .collect(),
    }
}

fn sqlite_config(encryption: EncryptionConfig) -> VaultConfig {
    VaultConfig {
        encryption,
        rotation_batch_size: 2,
        ..TestVault::config()
    }
}

#[tokio::test]
async fn test_key_rotation_on_sqlite() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let ctx = credvault::RequestContext::for_actor(ADMIN);

    let vault = Vault::open(
        SqliteStore::open(&path).unwrap(),
        VaultConfig {
            enforce_permissions: false,
            ..sqlite_config(keys(&[("old-password", true)]))
        },
    )
    .await
    .unwrap();

    for i in 0..5 {
        let request =
            SetRequest::new(&format!("/rotate/{}", i), CredentialValue::Value(format!("v{}", i)))
                .unwrap();
        vault.credentials().set(&ctx, request).await.unwrap();
    }

    vault
        .reload_encryption_keys(&keys(&[("old-password", false), ("new-password", true)]))
        .await
        .unwrap();
    let report = vault.rotate_keys().await.unwrap();
    assert_eq!(report.rotated, 5);
    assert_eq!(report.skipped, 0);

    // Nothing left to do
    let report = vault.rotate_keys().await.unwrap();
    assert_eq!(report.rotated, 0);
    drop(vault);

    // Reopen with only the new password: everything still decrypts
    let vault = Vault::open(
        SqliteStore::open(&path).unwrap(),
        VaultConfig {
            enforce_permissions: false,
            ..sqlite_config(keys(&[("new-password", true)]))
        },
    )
    .await
    .unwrap();
    let version = vault
        .credentials()
        .find_most_recent(&ctx, "/rotate/3")
        .await
        .unwrap();
    assert_eq!(
        vault.credentials().reveal(&version).unwrap(),
        CredentialValue::Value("v3".into())
    );
}

#[tokio::test]
async fn test_open_rejects_bad_key_config() {
    let store = SqliteStore::open_memory().unwrap();
    let result = Vault::open(
        store,
        sqlite_config(keys(&[("a", true), ("b", true)])),
    )
    .await;
    assert!(matches!(
        result,
        Err(VaultError::Validation(v)) if v.code == "error.config.multiple_active_keys"
    ));
}
