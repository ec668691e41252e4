//! 规则引擎集成测试
//!
//! 通过 HTTP 接口测试规则加载、校验、批量校验、历史查询和审批处理的完整流程。

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use procurement_shared::config::EngineConfig;
use rule_engine::RuleEngineService;
use rule_engine::api::{self, AppState};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn create_app() -> Router {
    let config = EngineConfig {
        history_capacity: 100,
        parallel_batch: true,
        rules_file: None,
    };
    api::router(AppState::new(Arc::new(RuleEngineService::new(&config))))
}

/// 采购规则配置：高额标记、部门必填、行项目合计、紧急交付通知
fn procurement_rules() -> Value {
    json!({
        "version": "1.0",
        "metadata": {
            "name": "Procurement validation rules",
            "created_by": "integration-test"
        },
        "rules": [
            {
                "id": "R001",
                "name": "High value purchase",
                "type": "approval",
                "priority": 1,
                "conditions": [
                    {"field": "totalAmount", "operator": "greater_than", "value": 10000}
                ],
                "actions": [{"type": "flag", "parameters": {"urgency": "High"}}]
            },
            {
                "id": "R002",
                "name": "Department is required",
                "type": "validation",
                "priority": 2,
                "conditions": [{"field": "department", "operator": "exists"}],
                "actions": [{"type": "approve", "parameters": {"setStatus": "Validated"}}]
            },
            {
                "id": "R003",
                "name": "Line item total",
                "type": "calculation",
                "priority": 3,
                "conditions": [{"field": "items", "operator": "exists"}],
                "actions": [{
                    "type": "calculate",
                    "parameters": {"target": "computedTotal", "formula": "line_items", "round": 2}
                }]
            },
            {
                "id": "R004",
                "name": "Trusted vendor",
                "type": "validation",
                "priority": 4,
                "conditions": [
                    {"field": "vendor.rating", "operator": "greater_equal", "value": 4, "logical_operator": "OR"},
                    {"field": "vendor.name", "operator": "in", "value": ["Acme", "Globex"]}
                ],
                "actions": [{"type": "notify", "parameters": {"channel": "vendors"}}]
            }
        ]
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(v) => builder.body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn loaded_app() -> Router {
    let app = create_app();
    let (status, body) = send(&app, "POST", "/api/rules/load", Some(procurement_rules())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    app
}

#[tokio::test]
async fn test_load_then_get_rules_round_trip() {
    let app = create_app();

    let (status, loaded) = send(&app, "POST", "/api/rules/load", Some(procurement_rules())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["success"], json!(true));
    assert_eq!(loaded["data"]["rulesCount"], json!(4));
    assert_eq!(loaded["data"]["summary"]["activeRules"], json!(4));

    let (status, rules) = send(&app, "GET", "/api/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rules["data"]["rulesCount"], loaded["data"]["rulesCount"]);
    assert_eq!(rules["data"]["ruleTypes"], loaded["data"]["summary"]["ruleTypes"]);
    assert_eq!(
        rules["data"]["ruleTypes"],
        json!(["approval", "validation", "calculation"])
    );
    assert_eq!(rules["data"]["rules"][0]["id"], json!("R001"));
}

#[tokio::test]
async fn test_get_rules_before_load_is_not_found() {
    let (status, body) = send(&create_app(), "GET", "/api/rules", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("RULE_NOT_FOUND"));
}

#[tokio::test]
async fn test_invalid_rule_set_reports_field_details() {
    let app = loaded_app().await;

    let mut bad = procurement_rules();
    bad["rules"][1]["priority"] = json!(11);
    bad["rules"][2]["conditions"][0]["operator"] = json!("matches");

    let (status, body) = send(&app, "POST", "/api/rules/load", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("SCHEMA_ERROR"));
    assert!(!body["data"]["details"].as_array().unwrap().is_empty());

    // 失败的加载不影响已有配置
    let (_, rules) = send(&app, "GET", "/api/rules", None).await;
    assert_eq!(rules["data"]["rules"][1]["priority"], json!(2));
}

#[tokio::test]
async fn test_malformed_expression_is_parse_error() {
    let app = create_app();
    let mut rules = procurement_rules();
    rules["rules"][0]["conditions"] = json!([{"expression": "totalAmount = 5"}]);

    let (status, body) = send(&app, "POST", "/api/rules/load", Some(rules)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("PARSE_ERROR"));
}

#[tokio::test]
async fn test_validate_high_value_purchase() {
    let app = loaded_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/validate",
        Some(json!({
            "procurement_data": {
                "id": "PR-1",
                "totalAmount": 15000,
                "department": "IT",
                "vendor": {"name": "Acme", "rating": 3},
                "items": [
                    {"quantity": 2, "unitPrice": 10.255},
                    {"quantity": 1, "unitPrice": 5}
                ]
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let summary = &body["data"];
    assert_eq!(summary["overallStatus"], json!("PASSED"));
    assert_eq!(summary["totalRules"], json!(4));
    assert_eq!(summary["processedData"]["urgency"], json!("High"));
    assert_eq!(summary["processedData"]["status"], json!("Validated"));
    assert_eq!(summary["processedData"]["computedTotal"], json!(25.51));
    assert_eq!(
        summary["recommendations"],
        json!(["All rules passed successfully. Procurement data is valid."])
    );
}

#[tokio::test]
async fn test_validate_failure_recommendations() {
    let app = loaded_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/validate",
        Some(json!({
            "procurement_data": {"totalAmount": 5000, "department": "IT"},
            "options": {"include_rule_details": true}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"];
    assert_eq!(summary["overallStatus"], json!("FAILED"));
    assert!(summary["processedData"].get("urgency").is_none());

    let recommendations: Vec<&str> = summary["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(recommendations.contains(&"Fix rule violation: High value purchase (R001)"));
    assert!(recommendations.contains(
        &"  - Field 'totalAmount' should greater_than '10000' but got '5000'"
    ));
}

#[tokio::test]
async fn test_stop_on_first_failure() {
    let app = loaded_app().await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/validate",
        Some(json!({
            "procurement_data": {"totalAmount": 1},
            "options": {"stop_on_first_failure": true}
        })),
    )
    .await;
    assert_eq!(body["data"]["totalRules"], json!(1));
    assert_eq!(body["data"]["failedRules"], json!(1));
}

#[tokio::test]
async fn test_validate_rejects_unknown_request_fields() {
    let app = loaded_app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/validate",
        Some(json!({"procurementData": {"totalAmount": 1}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("SCHEMA_ERROR"));
}

#[tokio::test]
async fn test_batch_validation_and_history() {
    let app = loaded_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/validate/batch",
        Some(json!({
            "procurement_records": [
                {"id": "PR-1", "totalAmount": 20000, "department": "IT", "items": [], "vendor": {"rating": 5}},
                {"totalAmount": 100},
                {"id": 42, "totalAmount": 50000, "department": "HR", "items": [], "vendor": {"name": "Globex"}}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let batch = &body["data"];
    assert_eq!(batch["batchSummary"]["totalRecords"], json!(3));
    assert_eq!(batch["batchSummary"]["passedRecords"], json!(2));
    assert_eq!(batch["batchSummary"]["overallStatus"], json!("FAILED"));
    assert_eq!(batch["results"][0]["recordId"], json!("PR-1"));
    assert_eq!(batch["results"][1]["recordId"], json!("record_1"));
    assert_eq!(batch["results"][2]["recordId"], json!("42"));

    let (status, history) = send(&app, "GET", "/api/validate/history?status=failed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"]["pagination"]["total"], json!(1));
    assert_eq!(history["data"]["data"][0]["type"], json!("batch"));

    let (_, stats) = send(&app, "GET", "/api/validate/stats", None).await;
    assert_eq!(stats["data"]["totalValidations"], json!(1));
    assert_eq!(stats["data"]["failedValidations"], json!(1));
}

#[tokio::test]
async fn test_history_pagination() {
    let app = loaded_app().await;
    for amount in [1, 20000, 30000] {
        send(
            &app,
            "POST",
            "/api/validate",
            Some(json!({"procurement_data": {"totalAmount": amount, "department": "IT", "items": [], "vendor": {"rating": 5}}})),
        )
        .await;
    }

    let (_, page) = send(&app, "GET", "/api/validate/history?page=2&limit=2", None).await;
    assert_eq!(page["data"]["pagination"]["total"], json!(3));
    assert_eq!(page["data"]["pagination"]["pages"], json!(2));
    // 倒序：第二页只剩最早的一条
    assert_eq!(page["data"]["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["data"]["data"][0]["overallStatus"], json!("FAILED"));

    let (status, _) = send(&app, "GET", "/api/validate/history?page=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_delete_rule() {
    let app = loaded_app().await;

    let (status, body) = send(
        &app,
        "PUT",
        "/api/rules/R004",
        Some(json!({"priority": 1, "active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["active"], json!(false));

    let (_, stats) = send(&app, "GET", "/api/rules/stats", None).await;
    assert_eq!(stats["data"]["totalRules"], json!(4));
    assert_eq!(stats["data"]["activeRules"], json!(3));
    assert_eq!(stats["data"]["inactiveRules"], json!(1));

    let (status, _) = send(&app, "PUT", "/api/rules/R001", Some(json!({"priority": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", "/api/rules/R002", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/api/rules/R002", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", "/api/rules/R002", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_request_approval_flow() {
    let app = create_app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/purchase-requests/approval-rules",
        Some(json!({
            "approvalRules": [
                {"condition": "totalAmount < 1000", "action": "autoApprove"},
                {"condition": "totalAmount >= 1000 && department == 'IT'", "action": "requireApproval", "approvalLevel": "Manager"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["rulesCount"], json!(2));

    let (status, body) = send(
        &app,
        "POST",
        "/api/purchase-requests/process",
        Some(json!({"prNumber": "PR-77", "totalAmount": 2500, "department": "IT"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("Pending Approval"));
    assert_eq!(body["data"]["approvalLevel"], json!("Manager"));
    assert_eq!(body["data"]["rulesApplied"], json!(1));

    let (status, _) = send(
        &app,
        "POST",
        "/api/purchase-requests/approval-rules",
        Some(json!({"approvalRules": [{"condition": "eval('x')", "action": "autoApprove"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
