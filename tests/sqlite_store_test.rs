mod common;

use common::*;
use nl2sql_engine::db::{PoolSettings, RelationalStore, SqliteStore, SyntaxCheck};
use nl2sql_engine::execution::ExecutionGateway;
use nl2sql_engine::few_shot::local_examples;
use nl2sql_engine::schema::SchemaService;
use nl2sql_engine::{FailureKind, WorkflowError, WorkflowState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// The guard must outlive the store; dropping it deletes the file.
async fn sqlite_store() -> (FixtureDb, Arc<SqliteStore>) {
    let db = fixture_db().await;
    let store = Arc::new(SqliteStore::new(db.path(), PoolSettings::default()));
    (db, store)
}

#[tokio::test]
async fn test_introspection_describes_tables_and_keys() {
    let (_db, store) = sqlite_store().await;
    let schema = SchemaService::new(store, Duration::from_secs(5)).retrieve().await.unwrap();

    let clubs = schema.table("clubs").unwrap();
    assert_eq!(clubs.columns.len(), 2);
    assert!(clubs.columns[0].primary_key);
    assert_eq!(clubs.columns[1].data_type, "TEXT");

    let text = schema.render();
    assert!(text.contains("Table 'clubs':\n  - clubId: INTEGER (Primary Key)\n  - clubName: TEXT\n"));
    assert!(text.contains("Table 'matches':"));
    assert!(text.contains("  - homeClubFinalScore: INTEGER\n"));
}

#[tokio::test]
async fn test_missing_database_is_schema_unavailable() {
    let path = std::env::temp_dir().join(format!("nl2sql-missing-{}.db", uuid::Uuid::new_v4()));
    let store = Arc::new(SqliteStore::new(path, PoolSettings::default()));
    let err = SchemaService::new(store, Duration::from_secs(5)).retrieve().await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::SchemaUnavailable);
    assert!(err.detail().contains("not found"));
}

#[tokio::test]
async fn test_syntax_check_reports_store_diagnostic() {
    let (_db, store) = sqlite_store().await;
    assert_eq!(store.check_syntax("SELECT clubName FROM clubs").await.unwrap(), SyntaxCheck::Valid);

    match store.check_syntax("SELEKT * FROM matches").await.unwrap() {
        SyntaxCheck::Invalid(diagnostic) => assert!(diagnostic.contains("syntax error")),
        SyntaxCheck::Valid => panic!("SELEKT must not pass the syntax check"),
    }
}

#[tokio::test]
async fn test_rows_keep_column_order_and_storage_types() {
    let (_db, store) = sqlite_store().await;
    let rows = store
        .execute(
            "SELECT matchId, homeClubName, homeClubFinalScore, homeClubFinalScore / 2.0 AS half, NULL AS empty_value, \
             x'0102' AS raw, 1.5e308 * 10 AS overflow FROM matches WHERE matchId = ?",
            &[json!(1)],
            None,
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let keys: Vec<&str> = rows[0].keys().map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        vec!["matchId", "homeClubName", "homeClubFinalScore", "half", "empty_value", "raw", "overflow"]
    );
    assert_eq!(rows[0]["matchId"], json!(1));
    assert_eq!(rows[0]["homeClubName"], json!("Feyenoord"));
    assert_eq!(rows[0]["homeClubFinalScore"], json!(2));
    assert_eq!(rows[0]["half"], json!(1.0));
    assert!(rows[0]["empty_value"].is_null());
    assert_eq!(rows[0]["raw"], json!([1, 2]));
    assert!(rows[0]["overflow"].is_null());
}

#[tokio::test]
async fn test_round_trip_matches_direct_store_execution() {
    let (_db, store) = sqlite_store().await;
    let sql = "SELECT clubId, clubName FROM clubs WHERE clubName <> ? ORDER BY clubId";
    let params = [json!("PSV")];

    let direct = store.execute(sql, &params, None).await.unwrap();
    let workflow = workflow(store, ScriptedCompletion::new(&[]));
    let via_workflow = workflow.validate_and_execute(sql, &params).await.unwrap();

    assert_eq!(via_workflow, direct);
    assert_eq!(
        via_workflow,
        vec![
            row(&[("clubId", json!(1)), ("clubName", json!("Feyenoord"))]),
            row(&[("clubId", json!(2)), ("clubName", json!("Ajax"))]),
        ]
    );
}

#[tokio::test]
async fn test_validate_and_execute_rejects_invalid_and_non_select() {
    let (_db, store) = sqlite_store().await;
    let workflow = workflow(store, ScriptedCompletion::new(&[]));

    let err = workflow.validate_and_execute("SELEKT 1", &[]).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidGenerationOutput);

    let err = workflow.validate_and_execute("SELECT FROM", &[]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::ValidationFailed(_)));

    let err = workflow.validate_and_execute("DELETE FROM clubs", &[]).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidGenerationOutput);
}

#[tokio::test]
async fn test_check_query_strips_fences() {
    let (_db, store) = sqlite_store().await;
    let workflow = workflow(store, ScriptedCompletion::new(&[]));

    let check = workflow.check_query("```sql\nSELECT clubName FROM clubs\n```").await.unwrap();
    assert_eq!(check, SyntaxCheck::Valid);
}

#[tokio::test]
async fn test_zero_matching_rows() {
    let (_db, store) = sqlite_store().await;
    let gateway = ExecutionGateway::new(store, Some(1000), Duration::from_secs(5));
    let rows = gateway
        .execute("SELECT matchId FROM matches WHERE homeClubName = 'Sparta'", &[])
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_gateway_row_cap() {
    let (_db, store) = sqlite_store().await;
    let gateway = ExecutionGateway::new(store, Some(2), Duration::from_secs(5));
    let rows = gateway.execute("SELECT matchId FROM matches ORDER BY matchId", &[]).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_store_is_read_only() {
    let (_db, store) = sqlite_store().await;
    let result = store.execute("DELETE FROM clubs", &[], None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_end_to_end_feyenoord_ajax_wins() {
    let (_db, store) = sqlite_store().await;
    let reply = format!("```sql\n{}\n```", local_examples()[0].query);
    let workflow = workflow(store, ScriptedCompletion::new(&[reply.as_str()]));

    let run = workflow.run(FEYENOORD_AJAX_QUESTION).await;

    assert_eq!(run.rows().unwrap(), &vec![row(&[("COUNT(*)", json!(2))])]);
    assert_eq!(run.final_state(), Some(WorkflowState::Executed));
}

#[tokio::test]
async fn test_end_to_end_repair_with_real_diagnostic() {
    let (_db, store) = sqlite_store().await;
    let llm = ScriptedCompletion::new(&[
        "SELEKT * FROM matches",
        "SELECT matchId FROM matches ORDER BY matchId LIMIT 5",
    ]);
    let workflow = workflow(store, llm.clone());

    let run = workflow.run("Welke wedstrijden?").await;

    assert_eq!(run.rows().unwrap().len(), 5);
    assert_eq!(run.attempts, 1);
    let repair = llm.prompts()[1].system_text().unwrap().to_string();
    assert!(repair.contains("near \"SELEKT\": syntax error"));
}

#[tokio::test]
async fn test_fixture_file_is_removed_on_drop() {
    let db = fixture_db().await;
    let path = db.path().to_path_buf();
    assert!(path.exists());
    drop(db);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_end_to_end_repair_exhausted_keeps_store_diagnostic() {
    let (_db, store) = sqlite_store().await;
    let llm = ScriptedCompletion::new(&["SELEKT * FROM matches", "SELECT * FORM matches"]);
    let workflow = workflow(store, llm);

    let run = workflow.run("Welke wedstrijden?").await;

    match run.error() {
        Some(WorkflowError::RepairExhausted(diagnostic)) => assert_eq!(diagnostic, "near \"FORM\": syntax error"),
        other => panic!("expected RepairExhausted, got {:?}", other),
    }
}
