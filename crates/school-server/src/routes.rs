//! Explicit controller route table.
//!
//! Every HTTP endpoint is declared once as a [`RouteDescriptor`]. The axum
//! router and the OpenAPI document are both generated from the same table,
//! so the documentation cannot list a route the server does not serve.

use crate::{api, api_courses, api_students, middleware};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use std::collections::BTreeMap;

/// HTTP methods used by the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Delete => MethodFilter::DELETE,
        }
    }

    /// Lower-case name, as used for OpenAPI operation keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Delete => "delete",
        }
    }
}

/// Shape of a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBody {
    /// No body.
    Empty,
    /// Free-form JSON object.
    Json,
    /// A single instance of the named component schema.
    One(&'static str),
    /// An array of the named component schema.
    Many(&'static str),
}

/// One endpoint: where it lives, how it is documented, who may call it.
#[derive(Debug, Clone, Copy)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    /// axum path syntax, e.g. `/api/students/{id}`.
    pub path: &'static str,
    pub operation_id: &'static str,
    pub summary: &'static str,
    pub tag: &'static str,
    /// Requires a bearer API key when keys are configured.
    pub authorize: bool,
    /// Component schema name of the JSON request body, if any.
    pub request_body: Option<&'static str>,
    pub success_status: u16,
    pub response: ResponseBody,
    /// Builds the method router for this endpoint from its method filter.
    pub handler: fn(MethodFilter) -> MethodRouter,
}

/// The controller routes served by the application.
pub fn controller_routes() -> Vec<RouteDescriptor> {
    vec![
        RouteDescriptor {
            method: HttpMethod::Get,
            path: "/health",
            operation_id: "GetHealth",
            summary: "Report server status and version",
            tag: "Health",
            authorize: false,
            request_body: None,
            success_status: 200,
            response: ResponseBody::Json,
            handler: |filter| on(filter, api::health_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Get,
            path: "/api/students",
            operation_id: "ListStudents",
            summary: "List all students",
            tag: "Students",
            authorize: false,
            request_body: None,
            success_status: 200,
            response: ResponseBody::Many("Student"),
            handler: |filter| on(filter, api_students::list_students_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Post,
            path: "/api/students",
            operation_id: "CreateStudent",
            summary: "Enroll a new student",
            tag: "Students",
            authorize: true,
            request_body: Some("NewStudent"),
            success_status: 201,
            response: ResponseBody::One("Student"),
            handler: |filter| on(filter, api_students::create_student_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Get,
            path: "/api/students/{id}",
            operation_id: "GetStudent",
            summary: "Fetch one student",
            tag: "Students",
            authorize: false,
            request_body: None,
            success_status: 200,
            response: ResponseBody::One("Student"),
            handler: |filter| on(filter, api_students::get_student_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Delete,
            path: "/api/students/{id}",
            operation_id: "DeleteStudent",
            summary: "Remove a student",
            tag: "Students",
            authorize: true,
            request_body: None,
            success_status: 204,
            response: ResponseBody::Empty,
            handler: |filter| on(filter, api_students::delete_student_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Get,
            path: "/api/courses",
            operation_id: "ListCourses",
            summary: "List all courses",
            tag: "Courses",
            authorize: false,
            request_body: None,
            success_status: 200,
            response: ResponseBody::Many("Course"),
            handler: |filter| on(filter, api_courses::list_courses_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Post,
            path: "/api/courses",
            operation_id: "CreateCourse",
            summary: "Add a course to the catalogue",
            tag: "Courses",
            authorize: true,
            request_body: Some("NewCourse"),
            success_status: 201,
            response: ResponseBody::One("Course"),
            handler: |filter| on(filter, api_courses::create_course_handler),
        },
        RouteDescriptor {
            method: HttpMethod::Get,
            path: "/api/courses/{id}",
            operation_id: "GetCourse",
            summary: "Fetch one course",
            tag: "Courses",
            authorize: false,
            request_body: None,
            success_status: 200,
            response: ResponseBody::One("Course"),
            handler: |filter| on(filter, api_courses::get_course_handler),
        },
    ]
}

/// Builds an axum router from a route table.
///
/// Descriptors sharing a path are merged into one method router. Routes
/// flagged `authorize` get the authorization middleware as a route layer, so
/// it runs after routing and only for those methods.
///
/// # Panics
///
/// Panics if two descriptors declare the same method on the same path.
pub fn build_router(routes: &[RouteDescriptor]) -> Router {
    let mut by_path: BTreeMap<&'static str, MethodRouter> = BTreeMap::new();

    for route in routes {
        let mut method_router = (route.handler)(route.method.filter());
        if route.authorize {
            method_router = method_router
                .route_layer(axum::middleware::from_fn(middleware::authorize_middleware));
        }

        let merged = match by_path.remove(route.path) {
            Some(existing) => existing.merge(method_router),
            None => method_router,
        };
        by_path.insert(route.path, merged);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        })
}
