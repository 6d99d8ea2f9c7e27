//! CORS middleware
//!
//! Transport-level CORS backed by the same allow-list the nonce-issuance
//! endpoint enforces, so a browser blocked by one layer is blocked by both.

use actix_cors::Cors;
use actix_web::http::header;

use crate::services::origin_policy::OriginPolicy;

/// Build CORS middleware from the origin allow-list
pub fn cors(policy: OriginPolicy) -> Cors {
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            origin
                .to_str()
                .map(|o| policy.is_allowed(Some(o)))
                .unwrap_or(false)
        })
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn test_handler() -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
    }

    fn policy() -> OriginPolicy {
        OriginPolicy::new(vec!["http://localhost:3000".to_string()], vec![])
    }

    #[actix_web::test]
    async fn test_cors_allowed_origin() {
        let app = test::init_service(
            App::new()
                .wrap(cors(policy()))
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Origin", "http://localhost:3000"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_cors_disallowed_origin() {
        let app = test::init_service(
            App::new()
                .wrap(cors(policy()))
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Origin", "http://evil.example.net"))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(!resp
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
