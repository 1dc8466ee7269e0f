//! Client-side live reload script.

use axum::http::header;
use axum::response::IntoResponse;

/// URL path of the script.
pub(crate) const SCRIPT_PATH: &str = "/__livereload.js";

/// URL path of the event stream.
pub(crate) const STREAM_PATH: &str = "/__livereload";

/// Script served at [`SCRIPT_PATH`]; reloads the page on any stream message.
const LIVE_RELOAD_JS: &str = r#"const es = new EventSource("/__livereload");
es.onmessage = () => location.reload();
console.log("[LiveReload] connected...");
"#;

/// Tag inserted into rendered pages.
const SCRIPT_TAG: &str = r#"<script src="/__livereload.js"></script>"#;

/// Closing marker the tag is inserted before.
const BODY_CLOSE: &str = "</body>";

/// Handle GET /__livereload.js.
pub(crate) async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        LIVE_RELOAD_JS,
    )
}

/// Insert the live reload script tag before the first `</body>`.
///
/// Pages without a closing body tag are returned unchanged.
pub(crate) fn inject_script(html: &str) -> String {
    if html.contains(BODY_CLOSE) {
        html.replacen(BODY_CLOSE, &format!("{SCRIPT_TAG}{BODY_CLOSE}"), 1)
    } else {
        html.to_owned()
    }
}
