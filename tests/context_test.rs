//! Integration tests for the persistence context facade over mocked drivers.

mod common;

use std::sync::Arc;

use common::{model, registry, row};
use db_model_context::error::ContextError;
use db_model_context::models::{CriteriaSet, MatchMode, QueryParam};
use db_model_context::{ExecutionContext, MemoryStore, PersistenceContext};
use serde_json::json;

async fn context() -> (PersistenceContext, common::MockDriver, common::MockDriver) {
    let (registry, crm, billing) = registry().await;
    let context = PersistenceContext::new(registry, Arc::new(MemoryStore::new()));
    context.install_model(model()).await.unwrap();
    (context, crm, billing)
}

#[tokio::test]
async fn test_get_object_by_pk_maps_properties() {
    let (context, crm, _) = context().await;
    crm.with(|s| s.rows = vec![row(json!({"id": 7, "first_name": "Ann"}))]);
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let found = context
        .get_object_by_pk(&mut ctx, "crm.public.person", &row(json!({"id": 7})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("firstName"), Some(&json!("Ann")));

    let (sql, params) = crm.with(|s| s.queried[0].clone());
    assert_eq!(sql, r#"SELECT * FROM "public"."person" WHERE "id" = ?"#);
    assert_eq!(params, vec![QueryParam::Int(7)]);
}

#[tokio::test]
async fn test_get_object_by_pk_string() {
    let (context, crm, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let found = context
        .get_object_by_pk_string(&mut ctx, "crm.public.person", "42")
        .await
        .unwrap();
    assert!(found.is_none());
    assert_eq!(crm.with(|s| s.queried[0].1.clone()), vec![QueryParam::Int(42)]);

    let err = context
        .get_object_by_pk_string(&mut ctx, "crm.public.person", "forty-two")
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_get_object_by_pk_requires_key() {
    let (context, _, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let err = context
        .get_object_by_pk(&mut ctx, "crm.public.person", &row(json!({"firstName": "Ann"})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Missing key property 'id'"));
}

#[tokio::test]
async fn test_get_objects_with_criteria() {
    let (context, _, billing) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let criteria = CriteriaSet::new("billing.public.invoice")
        .between("amount", 10, 20)
        .is_not_null("id");
    context.get_objects(&mut ctx, &criteria).await.unwrap();

    let (sql, params) = billing.with(|s| s.queried[0].clone());
    assert_eq!(
        sql,
        "SELECT * FROM `public`.`invoice` WHERE `amount` >= ? AND `amount` <= ? AND `id` IS NOT NULL"
    );
    assert_eq!(params, vec![QueryParam::Int(10), QueryParam::Int(20)]);
}

#[tokio::test]
async fn test_unknown_property_is_rejected() {
    let (context, crm, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let criteria = CriteriaSet::new("crm.public.person").eq("nickname", "x");
    let err = context.get_objects(&mut ctx, &criteria).await.unwrap_err();
    assert!(matches!(err, ContextError::UnknownProperty { .. }));
    assert!(crm.with(|s| s.queried.is_empty()));
}

#[tokio::test]
async fn test_query_template_with_criteria() {
    let (context, crm, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let criteria = CriteriaSet::new("crm.public.person").ilike("firstName", "an", MatchMode::StartsWith);
    context
        .get_objects_by_query_and_criteria(
            &mut ctx,
            "FROM crm.public.person WHERE id > %{filter.min}",
            &criteria,
            &json!({"filter": {"min": 5}}),
        )
        .await
        .unwrap();

    let (sql, params) = crm.with(|s| s.queried[0].clone());
    assert_eq!(
        sql,
        r#"SELECT * FROM "public"."person" WHERE id > ? AND LOWER("first_name") LIKE LOWER(?)"#
    );
    assert_eq!(params, vec![QueryParam::Int(5), QueryParam::from("an%")]);
}

#[tokio::test]
async fn test_query_without_target_is_ambiguous() {
    let (context, _, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    let err = context
        .get_objects_by_query(&mut ctx, "SELECT 1", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::AmbiguousQueryTarget { .. }));
}

#[tokio::test]
async fn test_get_related_objects() {
    let (context, crm, _) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    context
        .get_related_objects(
            &mut ctx,
            "crm.public.person",
            &row(json!({"id": 7, "firstName": "Ann"})),
            "addresses",
        )
        .await
        .unwrap();
    let (sql, params) = crm.with(|s| s.queried[0].clone());
    assert_eq!(sql, r#"SELECT * FROM "public"."address" WHERE "person_id" = ?"#);
    assert_eq!(params, vec![QueryParam::Int(7)]);

    let err = context
        .get_related_objects(&mut ctx, "crm.public.person", &row(json!({"id": 7})), "orders")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("orders"));
}

#[tokio::test]
async fn test_run_sql_binds_template_values() {
    let (context, _, billing) = context().await;
    let mut ctx = ExecutionContext::new();
    context.open_context(&mut ctx);

    context
        .run_sql(
            &mut ctx,
            "billing",
            "SELECT COUNT(*) AS n FROM billing.public.invoice WHERE amount > %{min}",
            &json!({"min": 100}),
        )
        .await
        .unwrap();
    let (sql, params) = billing.with(|s| s.queried[0].clone());
    assert_eq!(sql, "SELECT COUNT(*) AS n FROM `public`.`invoice` WHERE amount > ?");
    assert_eq!(params, vec![QueryParam::Int(100)]);
}

#[tokio::test]
async fn test_ddl_create_covers_every_database() {
    let (context, _, _) = context().await;
    let script = context.ddl_create().await.unwrap();

    assert!(script.contains("-- DB: crm"));
    assert!(script.contains("-- DB: billing"));
    assert!(script.contains("CREATE SCHEMA IF NOT EXISTS \"public\""));
    assert!(script.contains("\"id\" SERIAL"));
    assert!(script.contains("CREATE TABLE `public`.`invoice`"));
    let crm_at = script.find("-- DB: crm").unwrap();
    let fk_at = script.find("FOREIGN KEY (\"person_id\")").unwrap();
    assert!(fk_at > crm_at);
}

#[tokio::test]
async fn test_ddl_update_skips_unreadable_databases() {
    let (context, crm, _) = context().await;
    let mut live = common::crm_database();
    live.schemas[0].tables[1].columns.retain(|c| c.column_name != "city");
    crm.with(|s| s.live = Some(live));

    let script = context.ddl_update().await.unwrap();
    assert!(script.contains("-- DB: crm"));
    assert!(script.contains("ADD COLUMN \"city\""));
    assert!(!script.contains("-- DB: billing"));
}

#[tokio::test]
async fn test_status_and_save_model() {
    let (registry, _, _) = registry().await;
    let store = Arc::new(MemoryStore::new());
    let context = PersistenceContext::new(registry, store.clone());
    context.install_model(model()).await.unwrap();

    let statuses = context.status().await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|(_, status)| status.is_connected()));

    context.save_model().await.unwrap();
    assert!(store.description().await.unwrap().contains("fk_address_person"));

    let reloaded = context.load_model().await.unwrap();
    assert_eq!(reloaded.model().databases.len(), 2);
}
