use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use kiln_protocol::endpoints;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Kiln endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.request_body_limit();
    Router::new()
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::UPLOAD, post(handler::upload_handler))
        .route(endpoints::OBJECT, get(handler::object_handler))
        .route(endpoints::DOWNLOAD, post(handler::download_handler))
        .route(endpoints::EXISTS, post(handler::exists_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use tower::util::ServiceExt;

    use kiln_codec::{Chunk, WireObject, WireValue};
    use kiln_protocol::{
        DownloadResponse, ErrorResponse, ExistsResponse, HealthResponse, IdsRequest, ObjectEntry,
        UploadRequest, UploadResponse,
    };
    use kiln_types::{Closure, ObjectId};

    use crate::config::ServerConfig;

    fn chunk(name: &str) -> ObjectEntry {
        let mut body = WireObject::new();
        body.push("name", false, WireValue::String(name.into()));
        let chunk = Chunk::new(body, Closure::new()).unwrap();
        ObjectEntry::new(chunk.id, chunk.to_payload().unwrap())
    }

    fn app(config: ServerConfig) -> Router {
        build_router(Arc::new(AppState::new(config)))
    }

    fn json_request(method: Method, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router, stream: &str, objects: Vec<ObjectEntry>) -> Response {
        let request = json_request(
            Method::POST,
            &format!("/v1/streams/{stream}/objects"),
            &UploadRequest { objects },
        );
        app.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = app(ServerConfig::default())
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn upload_then_download() {
        let app = app(ServerConfig::default());
        let (a, b) = (chunk("a"), chunk("b"));

        let response = upload(&app, "s1", vec![a.clone(), b.clone()]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json::<UploadResponse>(response).await.stored, 2);

        let response = upload(&app, "s1", vec![a.clone()]).await;
        assert_eq!(body_json::<UploadResponse>(response).await.stored, 0);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/streams/s1/objects/{}", a.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, a.payload.as_bytes());

        let missing = ObjectId::from_bytes(b"missing");
        let request = json_request(
            Method::POST,
            "/v1/streams/s1/download",
            &IdsRequest { ids: vec![b.id, missing, a.id] },
        );
        let downloaded: DownloadResponse = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(downloaded.objects, vec![b.clone(), a.clone()]);

        let request = json_request(
            Method::POST,
            "/v1/streams/s1/exists",
            &IdsRequest { ids: vec![missing, a.id] },
        );
        let exists: ExistsResponse = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(exists.present, vec![a.id]);
    }

    #[tokio::test]
    async fn unknown_object_is_404() {
        let app = app(ServerConfig::default());
        let id = ObjectId::from_bytes(b"nope");
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/v1/streams/empty/objects/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.error.contains(&id.to_hex()));
    }

    #[tokio::test]
    async fn malformed_id_is_400() {
        let response = app(ServerConfig::default())
            .oneshot(
                Request::builder()
                    .uri("/v1/streams/s1/objects/not-hex")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mismatched_payload_is_rejected() {
        let app = app(ServerConfig::default());
        let good = chunk("good");
        let forged = ObjectEntry::new(chunk("other").id, good.payload.clone());

        let response = upload(&app, "s1", vec![good.clone(), forged]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Nothing from the rejected batch was stored.
        let request = json_request(Method::POST, "/v1/streams/s1/exists", &IdsRequest { ids: vec![good.id] });
        let exists: ExistsResponse = body_json(app.oneshot(request).await.unwrap()).await;
        assert!(exists.present.is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_is_413() {
        let app = app(ServerConfig {
            max_batch_bytes: 16,
            ..Default::default()
        });
        let response = upload(&app, "s1", vec![chunk("a much longer name than allowed")]).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn tokens_are_enforced() {
        let app = app(ServerConfig {
            tokens: vec!["secret".into()],
            ..Default::default()
        });

        let response = upload(&app, "s1", vec![chunk("a")]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request(
            Method::POST,
            "/v1/streams/s1/objects",
            &UploadRequest { objects: vec![chunk("a")] },
        );
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request(
            Method::POST,
            "/v1/streams/s1/objects",
            &UploadRequest { objects: vec![chunk("a")] },
        );
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_stream_is_400() {
        let response = upload(&app(ServerConfig::default()), "bad.stream", vec![chunk("a")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
