//! OpenAPI document generation and the Swagger UI.
//!
//! The document is rendered once at startup from the route table and served
//! as JSON at [`DOCUMENT_PATH`]. [`UI_PATH`] serves a Swagger UI page that
//! loads it. Both are mounted only in the Development environment.

use crate::routes::{ResponseBody, RouteDescriptor};
use axum::{
    http::header,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Router,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const DOCUMENT_PATH: &str = "/swagger/v1/swagger.json";
pub const UI_PATH: &str = "/swagger/index.html";
pub const UI_ROOT: &str = "/swagger";

const TITLE: &str = "School API";
const API_VERSION: &str = "v1";

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn component_schemas() -> Value {
    let name = json!({
        "type": "string",
        "minLength": 1,
        "maxLength": school_types::MAX_NAME_LEN
    });
    let date = json!({ "type": "string", "format": "date" });
    let credits = json!({
        "type": "integer",
        "minimum": 0,
        "maximum": school_types::MAX_COURSE_CREDITS
    });

    json!({
        "Student": {
            "type": "object",
            "required": ["id", "firstName", "lastName", "email", "enrollmentDate"],
            "properties": {
                "id": { "type": "integer", "format": "int64" },
                "firstName": name,
                "lastName": name,
                "email": { "type": "string", "format": "email" },
                "enrollmentDate": date,
            }
        },
        "NewStudent": {
            "type": "object",
            "required": ["firstName", "lastName", "email", "enrollmentDate"],
            "properties": {
                "firstName": name,
                "lastName": name,
                "email": { "type": "string", "format": "email" },
                "enrollmentDate": date,
            }
        },
        "Course": {
            "type": "object",
            "required": ["id", "title", "credits"],
            "properties": {
                "id": { "type": "integer", "format": "int64" },
                "title": name,
                "credits": credits,
            }
        },
        "NewCourse": {
            "type": "object",
            "required": ["title", "credits"],
            "properties": {
                "title": name,
                "credits": credits,
            }
        },
        "Error": {
            "type": "object",
            "required": ["error"],
            "properties": { "error": { "type": "string" } }
        }
    })
}

/// Path parameters named in `{braces}`, in order.
fn path_parameters(path: &str) -> Vec<Value> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| {
            let schema = if name == "id" || name.ends_with("Id") {
                json!({ "type": "integer", "format": "int64" })
            } else {
                json!({ "type": "string" })
            };
            json!({ "name": name, "in": "path", "required": true, "schema": schema })
        })
        .collect()
}

fn success_response(route: &RouteDescriptor) -> Value {
    let content = match route.response {
        ResponseBody::Empty => None,
        ResponseBody::Json => Some(json!({ "type": "object" })),
        ResponseBody::One(schema) => Some(schema_ref(schema)),
        ResponseBody::Many(schema) => {
            Some(json!({ "type": "array", "items": schema_ref(schema) }))
        }
    };

    let description = match route.success_status {
        201 => "Created",
        204 => "No Content",
        _ => "Success",
    };

    match content {
        Some(schema) => json!({
            "description": description,
            "content": { "application/json": { "schema": schema } }
        }),
        None => json!({ "description": description }),
    }
}

fn operation(route: &RouteDescriptor) -> Value {
    let mut op = Map::new();
    op.insert("tags".into(), json!([route.tag]));
    op.insert("summary".into(), json!(route.summary));
    op.insert("operationId".into(), json!(route.operation_id));

    let parameters = path_parameters(route.path);
    if !parameters.is_empty() {
        op.insert("parameters".into(), Value::Array(parameters));
    }

    if let Some(schema) = route.request_body {
        op.insert(
            "requestBody".into(),
            json!({
                "required": true,
                "content": { "application/json": { "schema": schema_ref(schema) } }
            }),
        );
    }

    let error = json!({
        "content": { "application/json": { "schema": schema_ref("Error") } }
    });
    let mut responses = Map::new();
    responses.insert(route.success_status.to_string(), success_response(route));
    if route.request_body.is_some() {
        let mut bad_request = error.clone();
        bad_request["description"] = json!("Bad Request");
        responses.insert("400".into(), bad_request);
    }
    if route.authorize {
        responses.insert("401".into(), json!({ "description": "Unauthorized" }));
        op.insert("security".into(), json!([{ "Bearer": [] }]));
    }
    if route.path.contains('{') {
        let mut not_found = error.clone();
        not_found["description"] = json!("Not Found");
        responses.insert("404".into(), not_found);
    }
    op.insert("responses".into(), Value::Object(responses));

    Value::Object(op)
}

/// Renders the OpenAPI 3.0 document for a route table.
pub fn document(routes: &[RouteDescriptor]) -> Value {
    let mut paths = Map::new();
    for route in routes {
        let item = paths
            .entry(route.path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = item {
            methods.insert(route.method.as_str().to_string(), operation(route));
        }
    }

    json!({
        "openapi": "3.0.1",
        "info": { "title": TITLE, "version": API_VERSION },
        "paths": paths,
        "components": {
            "schemas": component_schemas(),
            "securitySchemes": {
                "Bearer": { "type": "http", "scheme": "bearer" }
            }
        }
    })
}

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>School API - Swagger UI</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/swagger/v1/swagger.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

/// Router serving the document, the UI page, and a redirect from
/// [`UI_ROOT`] to the UI page.
pub fn docs_router(routes: &[RouteDescriptor]) -> Router {
    let body: Arc<str> = document(routes).to_string().into();

    Router::new()
        .route(
            DOCUMENT_PATH,
            get(move || {
                let body = body.clone();
                async move { ([(header::CONTENT_TYPE, "application/json")], body.to_string()) }
            }),
        )
        .route(UI_PATH, get(|| async { Html(SWAGGER_UI_HTML) }))
        .route(
            UI_ROOT,
            get(|| async { Redirect::permanent(UI_PATH).into_response() }),
        )
}
