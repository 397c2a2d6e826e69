//! OpenAPI documentation
//!
//! Provides the OpenAPI 3.0 description and Swagger UI for the CloudGreet
//! admin API.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

/// OpenAPI JSON specification endpoint
async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

/// Swagger UI HTML endpoint
async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn schema_ref(name: &str) -> Value {
    json!({"$ref": format!("#/components/schemas/{}", name)})
}

fn json_body(name: &str) -> Value {
    json!({"content": {"application/json": {"schema": schema_ref(name)}}})
}

fn ok(description: &str, schema: &str) -> Value {
    let mut response = json_body(schema);
    response["description"] = json!(description);
    response
}

fn error(description: &str) -> Value {
    ok(description, "ErrorResponse")
}

fn id_param(description: &str) -> Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "description": description,
        "schema": {"type": "string", "format": "uuid"}
    })
}

/// Get the OpenAPI specification as JSON
fn get_openapi_spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "CloudGreet Admin API",
            "description": "Outreach sequences, templates, prospecting and integration settings.\n\n## Authentication\n\nAll endpoints except health checks require an API key.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`",
            "version": "1.0.0"
        },
        "servers": [
            {"url": "/", "description": "This server"}
        ],
        "tags": [
            {"name": "health", "description": "Health check endpoints"},
            {"name": "sequences", "description": "Outreach sequences and enrollments"},
            {"name": "templates", "description": "Message templates"},
            {"name": "engagement", "description": "Replies, opt-outs and delivery receipts"},
            {"name": "stats", "description": "Outreach performance"},
            {"name": "settings", "description": "AI, prospecting and integration settings"}
        ],
        "paths": paths(),
        "components": {
            "securitySchemes": {
                "apiKey": {"type": "apiKey", "in": "header", "name": "X-API-Key"},
                "bearer": {"type": "http", "scheme": "bearer"}
            },
            "schemas": schemas()
        },
        "security": [{"apiKey": []}, {"bearer": []}]
    })
}

fn paths() -> Value {
    json!({
        "/health": {
            "get": {
                "tags": ["health"],
                "summary": "Basic health check",
                "operationId": "health",
                "security": [],
                "responses": {"200": ok("Service is healthy", "HealthResponse")}
            }
        },
        "/health/live": {
            "get": {
                "tags": ["health"],
                "summary": "Liveness probe",
                "operationId": "liveness",
                "security": [],
                "responses": {"200": {"description": "Service is alive"}}
            }
        },
        "/health/ready": {
            "get": {
                "tags": ["health"],
                "summary": "Readiness probe",
                "operationId": "readiness",
                "security": [],
                "responses": {
                    "200": {"description": "Service is ready"},
                    "503": {"description": "Storage is unreachable"}
                }
            }
        },
        "/health/detailed": {
            "get": {
                "tags": ["health"],
                "summary": "Health check with component status",
                "operationId": "healthDetailed",
                "security": [],
                "responses": {"200": ok("Detailed health status", "DetailedHealthResponse")}
            }
        },
        "/api/admin/outreach/sequences": {
            "get": {
                "tags": ["sequences"],
                "summary": "List sequences with steps and metrics",
                "operationId": "listSequences",
                "responses": {"200": ok("Sequences", "SequenceList")}
            },
            "post": {
                "tags": ["sequences"],
                "summary": "Create a sequence in draft status",
                "operationId": "createSequence",
                "requestBody": json_body("SequenceDraft"),
                "responses": {
                    "201": ok("Sequence created", "Sequence"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/sequences/{id}": {
            "get": {
                "tags": ["sequences"],
                "summary": "Get a sequence",
                "operationId": "getSequence",
                "parameters": [id_param("Sequence ID")],
                "responses": {
                    "200": ok("Sequence", "Sequence"),
                    "404": error("Sequence not found")
                }
            },
            "patch": {
                "tags": ["sequences"],
                "summary": "Update fields or change status",
                "description": "Allowed status changes: draft to active, active to paused, paused to active.",
                "operationId": "updateSequence",
                "parameters": [id_param("Sequence ID")],
                "requestBody": json_body("SequencePatch"),
                "responses": {
                    "200": ok("Sequence updated", "Sequence"),
                    "404": error("Sequence not found"),
                    "409": error("Status change not allowed"),
                    "422": error("Validation failed")
                }
            },
            "delete": {
                "tags": ["sequences"],
                "summary": "Delete a sequence and cancel its pending sends",
                "operationId": "deleteSequence",
                "parameters": [id_param("Sequence ID")],
                "responses": {
                    "204": {"description": "Sequence deleted"},
                    "404": error("Sequence not found")
                }
            }
        },
        "/api/admin/outreach/sequences/{id}/enrollments": {
            "get": {
                "tags": ["sequences"],
                "summary": "List enrollments",
                "operationId": "listEnrollments",
                "parameters": [id_param("Sequence ID")],
                "responses": {"200": ok("Enrollments", "EnrollmentList")}
            },
            "post": {
                "tags": ["sequences"],
                "summary": "Enroll a contact",
                "operationId": "enrollContact",
                "parameters": [id_param("Sequence ID")],
                "requestBody": json_body("EnrollContact"),
                "responses": {
                    "201": ok("Contact enrolled", "Enrollment"),
                    "409": error("Contact already enrolled"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/templates": {
            "get": {
                "tags": ["templates"],
                "summary": "List templates",
                "operationId": "listTemplates",
                "parameters": [
                    {"name": "channel", "in": "query", "schema": schema_ref("Channel")},
                    {"name": "active", "in": "query", "schema": {"type": "boolean"}}
                ],
                "responses": {"200": ok("Templates", "TemplateList")}
            },
            "post": {
                "tags": ["templates"],
                "summary": "Create a template",
                "operationId": "createTemplate",
                "requestBody": json_body("TemplateDraft"),
                "responses": {
                    "201": ok("Template created", "Template"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/templates/{id}": {
            "get": {
                "tags": ["templates"],
                "summary": "Get a template",
                "operationId": "getTemplate",
                "parameters": [id_param("Template ID")],
                "responses": {
                    "200": ok("Template", "Template"),
                    "404": error("Template not found")
                }
            },
            "patch": {
                "tags": ["templates"],
                "summary": "Update a template",
                "operationId": "updateTemplate",
                "parameters": [id_param("Template ID")],
                "requestBody": json_body("TemplateDraft"),
                "responses": {
                    "200": ok("Template updated", "Template"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/replies": {
            "post": {
                "tags": ["engagement"],
                "summary": "Record an inbound reply",
                "operationId": "recordReply",
                "requestBody": json_body("ReplyInput"),
                "responses": {
                    "200": ok("Reply recorded", "ReplyOutcome"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/opt-outs": {
            "get": {
                "tags": ["engagement"],
                "summary": "List opt-outs",
                "operationId": "listOptOuts",
                "parameters": [
                    {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 100, "maximum": 500}},
                    {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
                ],
                "responses": {"200": ok("Opt-outs", "OptOutList")}
            },
            "post": {
                "tags": ["engagement"],
                "summary": "Suppress an address",
                "operationId": "addOptOut",
                "requestBody": json_body("OptOutInput"),
                "responses": {
                    "201": ok("Opt-out recorded", "OptOut"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/outreach/sends/{id}/delivery": {
            "post": {
                "tags": ["engagement"],
                "summary": "Apply a delivery receipt",
                "operationId": "recordDelivery",
                "parameters": [id_param("Send ID")],
                "requestBody": json_body("DeliveryReceipt"),
                "responses": {
                    "200": ok("Send updated", "Send"),
                    "404": error("Send not found"),
                    "409": error("Send is not awaiting delivery")
                }
            }
        },
        "/api/admin/outreach/stats": {
            "get": {
                "tags": ["stats"],
                "summary": "Aggregated outreach performance",
                "operationId": "getStats",
                "parameters": [
                    {"name": "range", "in": "query", "schema": {"type": "string", "enum": ["7d", "30d", "90d"], "default": "7d"}}
                ],
                "responses": {
                    "200": ok("Stats", "OutreachStats"),
                    "422": error("Unknown range")
                }
            }
        },
        "/api/admin/ai-settings": {
            "get": {
                "tags": ["settings"],
                "summary": "AI receptionist settings",
                "operationId": "getAiSettings",
                "responses": {"200": ok("Settings", "AiSettings")}
            },
            "put": {
                "tags": ["settings"],
                "summary": "Update AI receptionist settings",
                "operationId": "putAiSettings",
                "requestBody": json_body("AiSettings"),
                "responses": {
                    "200": ok("Settings saved", "AiSettings"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/prospecting/filters": {
            "get": {
                "tags": ["settings"],
                "summary": "Saved prospecting filters",
                "operationId": "getProspectFilters",
                "responses": {"200": ok("Filters", "ProspectFiltersResponse")}
            },
            "post": {
                "tags": ["settings"],
                "summary": "Save prospecting filters",
                "operationId": "saveProspectFilters",
                "requestBody": json_body("ProspectFilters"),
                "responses": {
                    "200": ok("Filters saved", "ProspectFiltersResponse"),
                    "422": error("Validation failed")
                }
            }
        },
        "/api/admin/prospecting/sync": {
            "get": {
                "tags": ["settings"],
                "summary": "Recent sync runs",
                "operationId": "listSyncRuns",
                "responses": {"200": ok("Runs", "SyncRunList")}
            },
            "post": {
                "tags": ["settings"],
                "summary": "Queue a prospect sync",
                "operationId": "startSync",
                "responses": {
                    "202": ok("Sync queued", "SyncRun"),
                    "422": error("No filters saved")
                }
            }
        },
        "/api/admin/integrations": {
            "get": {
                "tags": ["settings"],
                "summary": "Integrations with masked credentials",
                "operationId": "listIntegrations",
                "responses": {"200": ok("Integrations", "IntegrationList")}
            },
            "post": {
                "tags": ["settings"],
                "summary": "Store integration credentials",
                "description": "Values are encrypted at rest; an empty value removes the field.",
                "operationId": "upsertIntegration",
                "requestBody": json_body("IntegrationUpsert"),
                "responses": {
                    "200": ok("Credentials saved", "Integration"),
                    "422": error("Validation failed")
                }
            }
        }
    })
}

fn schemas() -> Value {
    json!({
        "ErrorResponse": {
            "type": "object",
            "properties": {
                "error": {"type": "string"},
                "code": {"type": "string", "example": "VALIDATION_ERROR"}
            }
        },
        "HealthResponse": {
            "type": "object",
            "properties": {"status": {"type": "string", "example": "healthy"}}
        },
        "DetailedHealthResponse": {
            "type": "object",
            "properties": {
                "status": {"type": "string"},
                "checks": {
                    "type": "object",
                    "properties": {
                        "storage": {
                            "type": "object",
                            "properties": {
                                "status": {"type": "string"},
                                "backend": {"type": "string", "enum": ["postgres", "memory"]},
                                "latency_ms": {"type": "integer"},
                                "error": {"type": "string"}
                            }
                        }
                    }
                }
            }
        },
        "Channel": {"type": "string", "enum": ["email", "sms", "call"]},
        "SequenceStatus": {"type": "string", "enum": ["draft", "active", "paused"]},
        "StepInput": {
            "type": "object",
            "required": ["channel"],
            "properties": {
                "stepOrder": {"type": "integer", "description": "Ignored; steps are renumbered in array order"},
                "channel": schema_ref("Channel"),
                "waitMinutes": {"type": "integer", "minimum": 0, "default": 0},
                "templateId": {"type": "string", "format": "uuid", "nullable": true}
            }
        },
        "SequenceStep": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "stepOrder": {"type": "integer"},
                "channel": schema_ref("Channel"),
                "waitMinutes": {"type": "integer"},
                "templateId": {"type": "string", "format": "uuid", "nullable": true}
            }
        },
        "SequenceDraft": {
            "type": "object",
            "required": ["name", "steps"],
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "throttlePerDay": {"type": "integer", "minimum": 1, "default": 50},
                "sendWindowStart": {"type": "string", "example": "09:00"},
                "sendWindowEnd": {"type": "string", "example": "17:00"},
                "timezone": {"type": "string", "example": "America/New_York"},
                "autoPauseOnReply": {"type": "boolean", "default": true},
                "steps": {"type": "array", "minItems": 1, "items": schema_ref("StepInput")}
            }
        },
        "SequencePatch": {
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "throttlePerDay": {"type": "integer"},
                "sendWindowStart": {"type": "string"},
                "sendWindowEnd": {"type": "string"},
                "timezone": {"type": "string"},
                "autoPauseOnReply": {"type": "boolean"},
                "steps": {"type": "array", "items": schema_ref("StepInput")},
                "status": schema_ref("SequenceStatus")
            }
        },
        "Sequence": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "name": {"type": "string"},
                "description": {"type": "string", "nullable": true},
                "throttlePerDay": {"type": "integer"},
                "sendWindowStart": {"type": "string"},
                "sendWindowEnd": {"type": "string"},
                "timezone": {"type": "string"},
                "status": schema_ref("SequenceStatus"),
                "autoPauseOnReply": {"type": "boolean"},
                "steps": {"type": "array", "items": schema_ref("SequenceStep")},
                "metrics": {
                    "type": "object",
                    "properties": {
                        "sent": {"type": "integer"},
                        "delivered": {"type": "integer"},
                        "replied": {"type": "integer"},
                        "failed": {"type": "integer"}
                    }
                },
                "createdAt": {"type": "string", "format": "date-time"},
                "updatedAt": {"type": "string", "format": "date-time"}
            }
        },
        "SequenceList": {
            "type": "object",
            "properties": {"sequences": {"type": "array", "items": schema_ref("Sequence")}}
        },
        "EnrollContact": {
            "type": "object",
            "required": ["contactId"],
            "properties": {
                "contactId": {"type": "string"},
                "email": {"type": "string"},
                "phone": {"type": "string"},
                "firstName": {"type": "string"},
                "company": {"type": "string"}
            }
        },
        "Enrollment": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "sequenceId": {"type": "string", "format": "uuid"},
                "contactId": {"type": "string"},
                "status": {"type": "string", "enum": ["active", "paused", "completed", "opted_out", "cancelled"]},
                "nextStepOrder": {"type": "integer"},
                "nextDueAt": {"type": "string", "format": "date-time"}
            }
        },
        "EnrollmentList": {
            "type": "object",
            "properties": {"enrollments": {"type": "array", "items": schema_ref("Enrollment")}}
        },
        "TemplateDraft": {
            "type": "object",
            "required": ["name", "channel", "body"],
            "properties": {
                "name": {"type": "string"},
                "channel": {"type": "string", "enum": ["email", "sms"]},
                "subject": {"type": "string", "description": "Required for email"},
                "body": {"type": "string", "description": "Supports {{first_name}}, {{company}}, {{email}} and {{phone}}"},
                "complianceFooter": {"type": "string"},
                "isActive": {"type": "boolean", "default": true},
                "isDefault": {"type": "boolean", "default": false}
            }
        },
        "Template": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "name": {"type": "string"},
                "channel": schema_ref("Channel"),
                "subject": {"type": "string", "nullable": true},
                "body": {"type": "string"},
                "complianceFooter": {"type": "string"},
                "isActive": {"type": "boolean"},
                "isDefault": {"type": "boolean"},
                "createdAt": {"type": "string", "format": "date-time"},
                "updatedAt": {"type": "string", "format": "date-time"}
            }
        },
        "TemplateList": {
            "type": "object",
            "properties": {"templates": {"type": "array", "items": schema_ref("Template")}}
        },
        "ReplyInput": {
            "type": "object",
            "required": ["contactId"],
            "properties": {
                "contactId": {"type": "string"},
                "sequenceId": {"type": "string", "format": "uuid"},
                "channel": schema_ref("Channel"),
                "address": {"type": "string"},
                "optOut": {"type": "boolean", "default": false},
                "receivedAt": {"type": "string", "format": "date-time"}
            }
        },
        "ReplyOutcome": {
            "type": "object",
            "properties": {
                "pausedEnrollments": {"type": "array", "items": {"type": "string", "format": "uuid"}},
                "stoppedEnrollments": {"type": "array", "items": {"type": "string", "format": "uuid"}},
                "repliedSends": {"type": "array", "items": {"type": "string", "format": "uuid"}},
                "optedOut": {"type": "boolean"}
            }
        },
        "OptOutInput": {
            "type": "object",
            "required": ["channel", "address"],
            "properties": {
                "channel": schema_ref("Channel"),
                "address": {"type": "string"},
                "reason": {"type": "string"}
            }
        },
        "OptOut": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "channel": schema_ref("Channel"),
                "address": {"type": "string"},
                "source": {"type": "string", "enum": ["manual", "reply", "link"]},
                "reason": {"type": "string", "nullable": true},
                "createdAt": {"type": "string", "format": "date-time"}
            }
        },
        "OptOutList": {
            "type": "object",
            "properties": {"optOuts": {"type": "array", "items": schema_ref("OptOut")}}
        },
        "DeliveryReceipt": {
            "type": "object",
            "required": ["status"],
            "properties": {
                "status": {"type": "string", "enum": ["delivered", "failed"]},
                "error": {"type": "string"}
            }
        },
        "Send": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "sequenceId": {"type": "string", "format": "uuid", "nullable": true},
                "contactId": {"type": "string"},
                "stepOrder": {"type": "integer"},
                "channel": schema_ref("Channel"),
                "status": {"type": "string", "enum": ["processing", "sent", "delivered", "failed", "cancelled"]},
                "error": {"type": "string", "nullable": true},
                "initiatedAt": {"type": "string", "format": "date-time"},
                "deliveredAt": {"type": "string", "format": "date-time", "nullable": true}
            }
        },
        "ChannelStats": {
            "type": "object",
            "properties": {
                "channel": schema_ref("Channel"),
                "totalSent": {"type": "integer"},
                "delivered": {"type": "integer"},
                "replies": {"type": "integer"},
                "failed": {"type": "integer"},
                "replyRate": {"type": "number"},
                "deliveryRate": {"type": "number"}
            }
        },
        "OutreachStats": {
            "type": "object",
            "properties": {
                "range": {"type": "string", "enum": ["7d", "30d", "90d"]},
                "totalSent": {"type": "integer"},
                "delivered": {"type": "integer"},
                "replies": {"type": "integer"},
                "failed": {"type": "integer"},
                "replyRate": {"type": "number", "description": "Percent of sends, 0 when nothing was sent"},
                "deliveryRate": {"type": "number"},
                "byChannel": {"type": "array", "items": schema_ref("ChannelStats")}
            }
        },
        "AiSettings": {
            "type": "object",
            "properties": {
                "tone": {"type": "string", "enum": ["professional", "friendly", "casual", "formal"]},
                "greetingMessage": {"type": "string", "maxLength": 500},
                "escalationThreshold": {"type": "number", "minimum": 0, "maximum": 1},
                "afterHoursMessage": {"type": "string", "nullable": true},
                "maxCallMinutes": {"type": "integer", "minimum": 1, "maximum": 60},
                "updatedAt": {"type": "string", "format": "date-time", "nullable": true}
            }
        },
        "ProspectFilters": {
            "type": "object",
            "required": ["source"],
            "properties": {
                "source": {"type": "string", "enum": ["apollo", "clearbit"]},
                "industries": {"type": "array", "items": {"type": "string"}},
                "locations": {"type": "array", "items": {"type": "string"}},
                "titles": {"type": "array", "items": {"type": "string"}},
                "companySizeMin": {"type": "integer", "minimum": 1},
                "companySizeMax": {"type": "integer", "minimum": 1},
                "autoEnrollSequenceId": {"type": "string", "format": "uuid"}
            }
        },
        "ProspectFiltersResponse": {
            "type": "object",
            "properties": {"filters": {"allOf": [schema_ref("ProspectFilters")], "nullable": true}}
        },
        "SyncRun": {
            "type": "object",
            "properties": {
                "id": {"type": "string", "format": "uuid"},
                "source": {"type": "string"},
                "status": {"type": "string", "enum": ["queued", "running", "completed", "failed"]},
                "filters": {"type": "object"},
                "requestedAt": {"type": "string", "format": "date-time"}
            }
        },
        "SyncRunList": {
            "type": "object",
            "properties": {"runs": {"type": "array", "items": schema_ref("SyncRun")}}
        },
        "IntegrationUpsert": {
            "type": "object",
            "required": ["provider", "fields"],
            "properties": {
                "provider": {"type": "string", "enum": ["telnyx", "openai", "apollo", "clearbit", "google_calendar", "smtp"]},
                "fields": {"type": "object", "additionalProperties": {"type": "string"}}
            }
        },
        "Integration": {
            "type": "object",
            "properties": {
                "provider": {"type": "string"},
                "configured": {"type": "boolean"},
                "fields": {
                    "type": "object",
                    "additionalProperties": {"type": "string", "example": "••••abcd"}
                },
                "updatedAt": {"type": "string", "format": "date-time", "nullable": true}
            }
        },
        "IntegrationList": {
            "type": "object",
            "properties": {"integrations": {"type": "array", "items": schema_ref("Integration")}}
        }
    })
}

/// Swagger UI HTML template
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CloudGreet Admin API</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_admin_path_is_documented() {
        let spec = get_openapi_spec();
        let paths = spec["paths"].as_object().unwrap();
        for path in [
            "/api/admin/outreach/sequences",
            "/api/admin/outreach/sequences/{id}",
            "/api/admin/outreach/templates",
            "/api/admin/outreach/stats",
            "/api/admin/ai-settings",
            "/api/admin/prospecting/sync",
            "/api/admin/integrations",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
        assert_eq!(
            spec["paths"]["/api/admin/outreach/sequences"]["post"]["requestBody"]["content"]
                ["application/json"]["schema"]["$ref"],
            "#/components/schemas/SequenceDraft"
        );
    }

    #[test]
    fn referenced_schemas_exist() {
        let spec = get_openapi_spec();
        let text = spec["paths"].to_string();
        let schemas = spec["components"]["schemas"].as_object().unwrap();
        for part in text.split("#/components/schemas/").skip(1) {
            let name: String = part.chars().take_while(|c| c.is_alphanumeric()).collect();
            assert!(schemas.contains_key(&name), "missing schema {}", name);
        }
    }
}
