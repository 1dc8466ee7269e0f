//! Page handler.
//!
//! Maps request paths onto templates under the site root, renders them, and
//! falls back to static files for everything else.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use livedev_config::SiteConfig;
use percent_encoding::percent_decode_str;

use crate::error::ServerError;
use crate::live_reload::inject_script;
use crate::state::AppState;
use crate::static_files;

/// What a request path resolves to.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Render this template and respond with `status`.
    Template { path: PathBuf, status: StatusCode },
    /// Serve the request as a static file.
    Static,
}

/// Handle every request not claimed by another route.
pub(crate) async fn get_page(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, ServerError> {
    let url_path = percent_decode_str(req.uri().path())
        .decode_utf8_lossy()
        .into_owned();

    let resolution =
        resolve(&state.site, &url_path).ok_or_else(|| ServerError::NotFound(url_path.clone()))?;

    match resolution {
        Resolution::Template { path, status } => render_page(&state, path, status).await,
        Resolution::Static => Ok(static_files::serve(&state.site.root_dir, req).await),
    }
}

/// Resolve a decoded URL path against the site layout.
///
/// - `/dir/` renders `dir/<index_template>`
/// - `/page.html` renders `page.<template_extension>`
/// - anything else is a static file
///
/// Missing files resolve to the not-found template with status 404.
/// Returns `None` for paths that try to leave the root.
pub(crate) fn resolve(site: &SiteConfig, url_path: &str) -> Option<Resolution> {
    let relative = url_path.trim_start_matches('/');
    if !is_contained(Path::new(relative)) {
        return None;
    }

    let path = site.root_dir.join(relative);
    let (candidate, render) = if url_path.ends_with('/') {
        (path.join(&site.index_template), true)
    } else if let Some(stem) = relative.strip_suffix(".html") {
        let template = format!("{stem}.{}", site.template_extension);
        (site.root_dir.join(template), true)
    } else {
        (path, false)
    };

    if !candidate.exists() {
        return Some(Resolution::Template {
            path: site.root_dir.join(&site.not_found_template),
            status: StatusCode::NOT_FOUND,
        });
    }

    Some(if render {
        Resolution::Template {
            path: candidate,
            status: StatusCode::OK,
        }
    } else {
        Resolution::Static
    })
}

/// Whether a relative path stays inside the directory it is joined to.
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Render a template and build the HTML response.
async fn render_page(
    state: &AppState,
    template: PathBuf,
    status: StatusCode,
) -> Result<Response, ServerError> {
    if status == StatusCode::NOT_FOUND && !template.exists() {
        return Err(ServerError::NotFound(template.display().to_string()));
    }

    let renderer = Arc::clone(&state.renderer);
    let html = tokio::task::spawn_blocking(move || renderer.render(&template))
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;

    let html = if state.live_reload_enabled() {
        inject_script(&html)
    } else {
        html
    };

    Ok((
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn site(root: &Path) -> SiteConfig {
        SiteConfig {
            root_dir: root.to_path_buf(),
            ..SiteConfig::default()
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.jinja2"), "home").unwrap();
        std::fs::write(dir.path().join("about.jinja2"), "about").unwrap();
        std::fs::write(dir.path().join("404.jinja2"), "missing").unwrap();
        std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
        std::fs::create_dir(dir.path().join("blog")).unwrap();
        std::fs::write(dir.path().join("blog/index.jinja2"), "blog").unwrap();
        dir
    }

    #[test]
    fn test_resolve_root_index() {
        let dir = fixture();
        let site = site(dir.path());

        assert_eq!(
            resolve(&site, "/"),
            Some(Resolution::Template {
                path: dir.path().join("index.jinja2"),
                status: StatusCode::OK,
            })
        );
    }

    #[test]
    fn test_resolve_nested_index() {
        let dir = fixture();
        let site = site(dir.path());

        assert_eq!(
            resolve(&site, "/blog/"),
            Some(Resolution::Template {
                path: dir.path().join("blog/index.jinja2"),
                status: StatusCode::OK,
            })
        );
    }

    #[test]
    fn test_resolve_html_to_template() {
        let dir = fixture();
        let site = site(dir.path());

        assert_eq!(
            resolve(&site, "/about.html"),
            Some(Resolution::Template {
                path: dir.path().join("about.jinja2"),
                status: StatusCode::OK,
            })
        );
    }

    #[test]
    fn test_resolve_static_file() {
        let dir = fixture();
        let site = site(dir.path());

        assert_eq!(resolve(&site, "/style.css"), Some(Resolution::Static));
    }

    #[test]
    fn test_resolve_missing_uses_not_found_template() {
        let dir = fixture();
        let site = site(dir.path());

        for path in ["/nope.html", "/nope/", "/nope.png"] {
            assert_eq!(
                resolve(&site, path),
                Some(Resolution::Template {
                    path: dir.path().join("404.jinja2"),
                    status: StatusCode::NOT_FOUND,
                }),
                "{path}"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = fixture();
        let site = site(dir.path());

        assert_eq!(resolve(&site, "/../secret.html"), None);
        assert_eq!(resolve(&site, "/blog/../../etc/passwd"), None);
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("")));
        assert!(is_contained(Path::new("a/b.html")));
        assert!(!is_contained(Path::new("../a")));
        assert!(!is_contained(Path::new("/etc")));
    }
}
