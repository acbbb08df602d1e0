//! End-to-end decision scenarios over an embedded store.

mod helpers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apsis::cache::abac::AbacCache;
use apsis::cache::kv::MemoryKv;
use apsis::cache::session::SessionPermissionCache;
use apsis::engine::{self, rbac, CheckInput};
use apsis::entities;
use apsis::errors::ApsisError;
use apsis::events::bus::MemoryBus;
use apsis::store;
use helpers::db::TestDb;
use sea_orm::DatabaseConnection;

const BIZ: i64 = 10;
const USER: i64 = 1001;

struct Ctx {
    db: TestDb,
    sessions: SessionPermissionCache,
    abac: AbacCache,
}

impl Ctx {
    async fn new() -> Self {
        let db = TestDb::new().await;
        let kv = Arc::new(MemoryKv::new());
        let bus = Arc::new(MemoryBus::new());
        let sessions =
            SessionPermissionCache::new(kv.clone(), bus, "test.user-permissions".to_string());
        let abac = AbacCache::new(kv, Duration::from_secs(60));
        Self { db, sessions, abac }
    }

    fn db(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    async fn check(&self, resource_type: &str, resource_key: &str, actions: &[&str]) -> bool {
        self.check_as(USER, resource_type, resource_key, actions).await
    }

    async fn check_as(
        &self,
        user: i64,
        resource_type: &str,
        resource_key: &str,
        actions: &[&str],
    ) -> bool {
        let input = CheckInput {
            biz_id: BIZ,
            user_id: user,
            resource_type: resource_type.to_string(),
            resource_key: resource_key.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            overrides: HashMap::new(),
        };
        engine::check(self.db(), &self.sessions, &self.abac, &input, store::now_ms())
            .await
            .expect("check failed")
    }

    /// Mimics the write path: recompute and republish the user's snapshot.
    async fn reload(&self, users: &[i64]) {
        self.sessions
            .reload(self.db(), BIZ, users, store::now_ms())
            .await
            .expect("reload failed");
    }
}

async fn seed_doc_permission(db: &DatabaseConnection) -> entities::permission::Model {
    let resource = store::resources::create_resource(db, BIZ, "doc", "/a", "doc a", "", "")
        .await
        .unwrap();
    store::permissions::create_permission(db, BIZ, "read doc a", "", &resource, "read", "")
        .await
        .unwrap()
}

async fn seed_role_with_permission(
    db: &DatabaseConnection,
    name: &str,
    permission: &entities::permission::Model,
) -> entities::role::Model {
    let role = store::roles::create_role(db, BIZ, "custom", name, "", "", 0, 0)
        .await
        .unwrap();
    store::roles::add_role_permission(db, BIZ, role.id, permission)
        .await
        .unwrap();
    role
}

#[tokio::test]
async fn s1_rbac_allow() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role = seed_role_with_permission(ctx.db(), "reader", &permission).await;
    store::users::grant_user_role(ctx.db(), BIZ, USER, role.id, 0, 0)
        .await
        .unwrap();

    assert!(ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn s2_deny_overlay_overrides_role_allow() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role = seed_role_with_permission(ctx.db(), "reader", &permission).await;
    store::users::grant_user_role(ctx.db(), BIZ, USER, role.id, 0, 0)
        .await
        .unwrap();
    assert!(ctx.check("doc", "/a", &["read"]).await);

    let now = store::now_ms();
    store::users::grant_user_permission(
        ctx.db(),
        BIZ,
        USER,
        permission.id,
        "deny",
        now - 3_600_000,
        now + 3_600_000,
    )
    .await
    .unwrap();
    ctx.reload(&[USER]).await;

    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn conflicting_overlays_resolve_to_deny() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    store::users::grant_user_permission(ctx.db(), BIZ, USER, permission.id, "allow", 0, 0)
        .await
        .unwrap();
    store::users::grant_user_permission(ctx.db(), BIZ, USER, permission.id, "deny", 0, 0)
        .await
        .unwrap();

    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn allow_overlay_grants_without_a_role() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    store::users::grant_user_permission(ctx.db(), BIZ, USER, permission.id, "allow", 0, 0)
        .await
        .unwrap();

    assert!(ctx.check("doc", "/a", &["read"]).await);
    // A different user gets nothing from it.
    assert!(!ctx.check_as(2002, "doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn s3_role_inclusion_transitivity() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role_a = store::roles::create_role(ctx.db(), BIZ, "custom", "a", "", "", 0, 0)
        .await
        .unwrap();
    let role_b = seed_role_with_permission(ctx.db(), "b", &permission).await;
    let role_c = store::roles::create_role(ctx.db(), BIZ, "custom", "c", "", "", 0, 0)
        .await
        .unwrap();
    store::roles::add_inclusion(ctx.db(), BIZ, role_a.id, role_b.id)
        .await
        .unwrap();
    store::roles::add_inclusion(ctx.db(), BIZ, role_b.id, role_c.id)
        .await
        .unwrap();
    store::users::grant_user_role(ctx.db(), BIZ, USER, role_a.id, 0, 0)
        .await
        .unwrap();

    assert!(ctx.check("doc", "/a", &["read"]).await);

    store::roles::remove_inclusion(ctx.db(), BIZ, role_a.id, role_b.id)
        .await
        .unwrap();
    ctx.reload(&[USER]).await;
    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn inclusion_cycles_terminate() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role_a = store::roles::create_role(ctx.db(), BIZ, "custom", "a", "", "", 0, 0)
        .await
        .unwrap();
    let role_b = seed_role_with_permission(ctx.db(), "b", &permission).await;
    store::roles::add_inclusion(ctx.db(), BIZ, role_a.id, role_b.id)
        .await
        .unwrap();
    store::roles::add_inclusion(ctx.db(), BIZ, role_b.id, role_a.id)
        .await
        .unwrap();
    store::users::grant_user_role(ctx.db(), BIZ, USER, role_a.id, 0, 0)
        .await
        .unwrap();

    assert!(ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn expired_user_role_does_not_grant() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role = seed_role_with_permission(ctx.db(), "reader", &permission).await;
    let now = store::now_ms();
    store::users::grant_user_role(ctx.db(), BIZ, USER, role.id, now - 7_200_000, now - 3_600_000)
        .await
        .unwrap();

    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn unmanaged_resource_is_open() {
    let ctx = Ctx::new().await;
    // No permission registered for this resource at all.
    assert!(ctx.check("doc", "/unregistered", &["read"]).await);
}

#[tokio::test]
async fn registered_permission_without_grant_denies() {
    let ctx = Ctx::new().await;
    seed_doc_permission(ctx.db()).await;
    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

async fn seed_age_policy(
    db: &DatabaseConnection,
    permission: &entities::permission::Model,
    effect: &str,
) -> entities::policy::Model {
    let def = store::attributes::create_definition(db, BIZ, "age", "", "number", "subject", "")
        .await
        .unwrap();
    let policy = store::policies::create_policy(db, BIZ, "age-range", "", "active", "logic")
        .await
        .unwrap();
    let left = store::policies::save_rule(db, BIZ, policy.id, def.id, "20", ">=", 0, 0)
        .await
        .unwrap();
    let right = store::policies::save_rule(db, BIZ, policy.id, def.id, "30", "<=", 0, 0)
        .await
        .unwrap();
    store::policies::save_rule(db, BIZ, policy.id, 0, "", "AND", left.id, right.id)
        .await
        .unwrap();
    store::policies::attach_policy(db, BIZ, permission.id, policy.id, effect)
        .await
        .unwrap();
    policy
}

#[tokio::test]
async fn s4_abac_age_range() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    seed_age_policy(ctx.db(), &permission, "allow").await;

    let def = store::attributes::list_definitions(ctx.db(), BIZ, 0).await.unwrap();
    let age_def = def.iter().find(|d| d.name == "age").unwrap();
    store::attributes::set_subject_value(ctx.db(), BIZ, USER, age_def.id, "25")
        .await
        .unwrap();
    ctx.abac.invalidate_subject(BIZ, USER).await;
    assert!(ctx.check("doc", "/a", &["read"]).await);

    store::attributes::set_subject_value(ctx.db(), BIZ, USER, age_def.id, "31")
        .await
        .unwrap();
    ctx.abac.invalidate_subject(BIZ, USER).await;
    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn s5_abac_datetime_window() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let def = store::attributes::create_definition(
        ctx.db(),
        BIZ,
        "time",
        "",
        "datetime",
        "environment",
        "",
    )
    .await
    .unwrap();
    let policy = store::policies::create_policy(ctx.db(), BIZ, "office-hours", "", "active", "logic")
        .await
        .unwrap();
    let left = store::policies::save_rule(ctx.db(), BIZ, policy.id, def.id, "@day(09:00)", ">=", 0, 0)
        .await
        .unwrap();
    let right = store::policies::save_rule(ctx.db(), BIZ, policy.id, def.id, "@day(18:00)", "<=", 0, 0)
        .await
        .unwrap();
    store::policies::save_rule(ctx.db(), BIZ, policy.id, 0, "", "AND", left.id, right.id)
        .await
        .unwrap();
    store::policies::attach_policy(ctx.db(), BIZ, permission.id, policy.id, "allow")
        .await
        .unwrap();

    // 2025-06-01T12:00Z: inside the 09:00-18:00 window of its own day.
    store::attributes::set_environment_value(ctx.db(), BIZ, def.id, "1748779200000")
        .await
        .unwrap();
    ctx.abac.invalidate_environment(BIZ).await;
    assert!(ctx.check("doc", "/a", &["read"]).await);

    // 2025-06-01T20:00Z: outside the window.
    store::attributes::set_environment_value(ctx.db(), BIZ, def.id, "1748808000000")
        .await
        .unwrap();
    ctx.abac.invalidate_environment(BIZ).await;
    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn s6_mixed_allow_and_deny_policies() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    seed_age_policy(ctx.db(), &permission, "allow").await;

    // A second matching policy votes deny on the same permission.
    let deny_policy =
        store::policies::create_policy(ctx.db(), BIZ, "lockout", "", "active", "logic")
            .await
            .unwrap();
    store::policies::attach_policy(ctx.db(), BIZ, permission.id, deny_policy.id, "deny")
        .await
        .unwrap();

    let defs = store::attributes::list_definitions(ctx.db(), BIZ, 0).await.unwrap();
    let age_def = defs.iter().find(|d| d.name == "age").unwrap();
    store::attributes::set_subject_value(ctx.db(), BIZ, USER, age_def.id, "25")
        .await
        .unwrap();

    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn policy_with_no_rules_votes_its_effect() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let policy = store::policies::create_policy(ctx.db(), BIZ, "blanket", "", "active", "logic")
        .await
        .unwrap();
    store::policies::attach_policy(ctx.db(), BIZ, permission.id, policy.id, "allow")
        .await
        .unwrap();

    assert!(ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn inactive_policies_are_skipped() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let policy = store::policies::create_policy(ctx.db(), BIZ, "off", "", "inactive", "logic")
        .await
        .unwrap();
    store::policies::attach_policy(ctx.db(), BIZ, permission.id, policy.id, "allow")
        .await
        .unwrap();

    // The only policy is inactive, and no role grants the permission.
    assert!(!ctx.check("doc", "/a", &["read"]).await);
}

#[tokio::test]
async fn caller_overrides_feed_the_subject_bag() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    seed_age_policy(ctx.db(), &permission, "allow").await;
    // No stored age; the caller supplies it.
    let mut overrides = HashMap::new();
    overrides.insert("age".to_string(), "25".to_string());
    let input = CheckInput {
        biz_id: BIZ,
        user_id: USER,
        resource_type: "doc".to_string(),
        resource_key: "/a".to_string(),
        actions: vec!["read".to_string()],
        overrides,
    };
    let allowed = engine::check(ctx.db(), &ctx.sessions, &ctx.abac, &input, store::now_ms())
        .await
        .unwrap();
    assert!(allowed);
}

#[tokio::test]
async fn affected_users_follow_the_reverse_closure() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let role_a = store::roles::create_role(ctx.db(), BIZ, "custom", "a", "", "", 0, 0)
        .await
        .unwrap();
    let role_b = store::roles::create_role(ctx.db(), BIZ, "custom", "b", "", "", 0, 0)
        .await
        .unwrap();
    let role_c = seed_role_with_permission(ctx.db(), "c", &permission).await;
    store::roles::add_inclusion(ctx.db(), BIZ, role_a.id, role_b.id)
        .await
        .unwrap();
    store::roles::add_inclusion(ctx.db(), BIZ, role_b.id, role_c.id)
        .await
        .unwrap();

    // u1 holds a (reaches c through b); u2 holds c directly; u3 holds an
    // unrelated role.
    let unrelated = store::roles::create_role(ctx.db(), BIZ, "custom", "other", "", "", 0, 0)
        .await
        .unwrap();
    store::users::grant_user_role(ctx.db(), BIZ, 1, role_a.id, 0, 0).await.unwrap();
    store::users::grant_user_role(ctx.db(), BIZ, 2, role_c.id, 0, 0).await.unwrap();
    store::users::grant_user_role(ctx.db(), BIZ, 3, unrelated.id, 0, 0).await.unwrap();

    let affected = rbac::affected_users(ctx.db(), BIZ, role_c.id).await.unwrap();
    assert_eq!(affected, vec![1, 2]);
}

#[tokio::test]
async fn unique_conflicts_surface_on_create() {
    let ctx = Ctx::new().await;
    store::roles::create_role(ctx.db(), BIZ, "custom", "dup", "", "", 0, 0)
        .await
        .unwrap();
    let err = store::roles::create_role(ctx.db(), BIZ, "custom", "dup", "", "", 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ApsisError::UniqueConflict(_)));
}

#[tokio::test]
async fn abac_decide_open_default_and_deny_overrides() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;

    let input = CheckInput {
        biz_id: BIZ,
        user_id: USER,
        resource_type: "doc".to_string(),
        resource_key: "/a".to_string(),
        actions: vec!["read".to_string()],
        overrides: HashMap::new(),
    };

    // No candidate policy: the ABAC engine's decision is open.
    assert!(apsis::engine::abac::decide(ctx.db(), &ctx.abac, &input).await.unwrap());

    // An attached matching deny policy flips it.
    let policy = store::policies::create_policy(ctx.db(), BIZ, "block", "", "active", "logic")
        .await
        .unwrap();
    store::policies::attach_policy(ctx.db(), BIZ, permission.id, policy.id, "deny")
        .await
        .unwrap();
    assert!(!apsis::engine::abac::decide(ctx.db(), &ctx.abac, &input).await.unwrap());
}

#[tokio::test]
async fn policy_cascade_delete_is_complete() {
    let ctx = Ctx::new().await;
    let permission = seed_doc_permission(ctx.db()).await;
    let policy = seed_age_policy(ctx.db(), &permission, "allow").await;

    store::policies::delete_policy(ctx.db(), BIZ, policy.id).await.unwrap();

    assert!(store::policies::get_policy(ctx.db(), BIZ, policy.id).await.unwrap().is_none());
    let rules = store::policies::find_policy_rules_by_policy_ids(ctx.db(), &[policy.id])
        .await
        .unwrap();
    assert!(rules.is_empty());
    let bindings = store::policies::find_policies_by_permission_ids(ctx.db(), BIZ, &[permission.id])
        .await
        .unwrap();
    assert!(bindings.is_empty());
}
