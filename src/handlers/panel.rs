use axum::response::Html;

const CONTROL_PANEL: &str = include_str!("../../assets/index.html");

/// The single-page control panel
pub async fn control_panel() -> Html<&'static str> {
    Html(CONTROL_PANEL)
}
