//! End-to-end: CSV text -> mapping -> validation -> export, through the
//! library API and through the HTTP API.

use datamend::{
    parse_bytes_auto, server::router, ConfigStore, ExportSession, PipelineError, Settings, TargetEntitySpec,
    TargetFieldSpec, TextConstraints, ValidationOptions,
};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;

const CONTACTS_CSV: &str = "\
Customer Name;email_address;Signed Up;Active;Score
Ada Lovelace;ada@example.com;12/10/2023;true;97
\"Turing; Alan\";alan@example.com;2024-01-05;0;88
";

fn contacts() -> TargetEntitySpec {
    TargetEntitySpec {
        id: "contacts".into(),
        name: "Contacts".into(),
        url: "/v1/contacts".into(),
        fields: vec![
            TargetFieldSpec::text(
                "customer_name",
                TextConstraints { min_length: Some(2), max_length: Some(80), pattern: None },
            )
            .required(),
            TargetFieldSpec::email("email").required(),
            TargetFieldSpec::date("signed_up"),
            TargetFieldSpec::boolean("active"),
            TargetFieldSpec::number("score", Some(0.0), Some(100.0)),
        ],
    }
}

fn write_config(path: &Path) {
    let mut store = ConfigStore::open(path);
    store.set_base_url("http://127.0.0.1:9").unwrap();
    store.upsert_entity(contacts()).unwrap();
}

#[test]
fn csv_to_export_through_a_session() {
    let parsed = parse_bytes_auto(CONTACTS_CSV.as_bytes()).unwrap();
    assert_eq!(parsed.delimiter, ';');

    let mut session = ExportSession::new(parsed.dataset, ValidationOptions::default());
    session.select_entity(contacts());

    // "email_address" does not normalize to "email"
    let report = session.validate().unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.errors[0].message, "Row 1: Field 'email' is required by the API but not mapped to any column");
    assert!(matches!(session.export_csv(), Err(PipelineError::ValidationFailed { .. })));

    session.set_field_mapping("email", Some("email_address")).unwrap();
    assert_eq!(session.mapping().source_for("signed_up"), Some("Signed Up"));
    assert!(session.report().is_none());

    assert!(session.validate().unwrap().is_valid());
    let csv = session.export_csv().unwrap();
    assert_eq!(
        csv,
        "customer_name,email,signed_up,active,score\n\
         Ada Lovelace,ada@example.com,2023-12-10,true,97\n\
         Turing; Alan,alan@example.com,2024-01-05,false,88\n"
    );

    let json: Value = serde_json::from_str(&session.export_json().unwrap()).unwrap();
    assert_eq!(json[1]["customer_name"], "Turing; Alan");
    assert_eq!(json[1]["active"], false);
    assert_eq!(json[0]["score"], 97);
}

#[test]
fn broken_config_document_yields_no_entities() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("export-config.json");
    std::fs::write(&path, r#"{ "entities": [{ "id": "contacts" }] }"#).unwrap();

    let store = ConfigStore::open(&path);
    assert!(store.entities().is_empty());
    assert!(store.notice().is_some());
}

async fn spawn_server(config_path: &Path) -> String {
    let settings = Settings {
        config_path: config_path.to_path_buf(),
        dry_run: true,
        ..Settings::default()
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(settings)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn request_body(mapping: Value) -> Value {
    json!({
        "entityId": "contacts",
        "headers": ["Customer Name", "email_address", "Signed Up", "Active", "Score"],
        "rows": [
            { "Customer Name": "Ada Lovelace", "email_address": "ada@example.com", "Signed Up": "12/10/2023", "Active": "true", "Score": "97" },
            { "Customer Name": "A", "email_address": "not-an-email", "Signed Up": "someday", "Active": "yes", "Score": "140" }
        ],
        "mapping": mapping
    })
}

#[tokio::test]
async fn http_api_validates_and_blocks_exports() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("export-config.json");
    write_config(&config_path);
    let base = spawn_server(&config_path).await;
    let client = reqwest::Client::new();

    let entities: Value = client.get(format!("{}/api/entities", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(entities["entities"][0]["id"], "contacts");

    let auto: Value = client
        .post(format!("{}/api/mapping/auto", base))
        .json(&json!({ "entityId": "contacts", "headers": ["Customer Name", "email_address"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(auto["mapping"]["customer_name"], "Customer Name");
    assert_eq!(auto["missingRequired"], json!(["email"]));

    let mapping = json!({
        "customer_name": "Customer Name",
        "email": "email_address",
        "signed_up": "Signed Up",
        "active": "Active",
        "score": "Score"
    });

    let validated: Value = client
        .post(format!("{}/api/validate", base))
        .json(&request_body(mapping.clone()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(validated["canExport"], false);
    assert_eq!(validated["report"]["totalErrors"], 5);
    assert_eq!(validated["report"]["invalidRows"], 1);
    assert_eq!(validated["report"]["errors"][0]["rowIndex"], 1);
    assert_eq!(validated["report"]["errors"][0]["kind"]["code"], "too_short");

    let blocked = client
        .post(format!("{}/api/export/csv", base))
        .json(&request_body(mapping.clone()))
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = blocked.json().await.unwrap();
    assert_eq!(body["validation"]["report"]["totalErrors"], 5);
}

#[tokio::test]
async fn http_api_exports_clean_rows() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("export-config.json");
    write_config(&config_path);
    let base = spawn_server(&config_path).await;
    let client = reqwest::Client::new();

    let body = json!({
        "entityId": "contacts",
        "rows": [{ "Customer Name": "Ada Lovelace", "email_address": "ada@example.com" }],
        "mapping": { "customer_name": "Customer Name", "email": "email_address" }
    });

    let response = client.post(format!("{}/api/export/csv", base)).json(&body).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/csv"));
    assert_eq!(
        response.text().await.unwrap(),
        "customer_name,email,signed_up,active,score\nAda Lovelace,ada@example.com,,,\n"
    );

    let submitted: Value = client
        .post(format!("{}/api/export/submit", base))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submitted["receipt"]["dryRun"], true);
    assert_eq!(submitted["receipt"]["url"], "http://127.0.0.1:9/v1/contacts");

    let with_nulls = json!({
        "entityId": "contacts",
        "rows": [{ "Customer Name": "Ada Lovelace", "email_address": "ada@example.com", "Score": "97" }],
        "mapping": { "customer_name": "Customer Name", "email": "email_address", "score": null, "active": null }
    });
    let validated: Value = client
        .post(format!("{}/api/validate", base))
        .json(&with_nulls)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(validated["canExport"], true);
    let exported = client.post(format!("{}/api/export/csv", base)).json(&with_nulls).send().await.unwrap();
    assert_eq!(
        exported.text().await.unwrap(),
        "customer_name,email,signed_up,active,score\nAda Lovelace,ada@example.com,,,\n"
    );

    let missing = client
        .post(format!("{}/api/validate", base))
        .json(&json!({ "entityId": "deals", "rows": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let bad_column = client
        .post(format!("{}/api/validate", base))
        .json(&json!({ "entityId": "contacts", "rows": [{ "A": "x" }], "mapping": { "email": "Mail" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_column.status(), reqwest::StatusCode::BAD_REQUEST);
}
