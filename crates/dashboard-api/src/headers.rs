use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Dashboard payloads change every cycle; never let a proxy or browser cache them.
pub async fn dashboard_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));

    response
}
