use axum::response::Html;

const INDEX_HTML: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/index.html"));

// axum handler for the keypad landing page
pub async fn root() -> Html<&'static str> {
    Html(INDEX_HTML)
}
