//! Integration tests for routes loaded from disk.
//!
//! A routes tree is written to a temporary directory and served through
//! `DiskSource`, exercising discovery, layouts, partials, parameters and
//! error pages together.

use std::{fs, path::Path, sync::Arc};

use syncframe_server::{App, DiskSource, ModuleRegistry, PageRequest, StoreConfig};
use tempfile::tempdir;

fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

async fn app(root: &Path) -> App {
    App::new(Arc::new(DiskSource::new(root)), ModuleRegistry::new(), StoreConfig::default()).await.unwrap()
}

#[tokio::test]
async fn index_route_is_served_at_its_directory_with_layout() {
    let dir = tempdir().unwrap();
    write(dir.path(), "home/_layout.html", "<html><body><main>{{ slot }}</main></body></html>");
    write(dir.path(), "home/index.html", "<h1>Home</h1>");
    let app = app(dir.path()).await;

    for path in ["/home", "/home/index"] {
        let page = app.get(PageRequest::get(path)).await;
        assert_eq!(page.status, 200, "{path}");
        assert_eq!(page.body.matches("<h1>Home</h1>").count(), 1, "{}", page.body);
        assert!(page.body.contains("<main><h1>Home</h1></main>"), "{}", page.body);
    }
    assert_eq!(app.store().cache().len(), 1, "alias shares one compiled route");
}

#[tokio::test]
async fn nested_routes_use_the_nearest_layout() {
    let dir = tempdir().unwrap();
    write(dir.path(), "_layout.html", "<html><body id=\"root\">{{ slot }}</body></html>");
    write(dir.path(), "blog/post.html", "<article>post</article>");
    let app = app(dir.path()).await;

    let page = app.get(PageRequest::get("/blog/post")).await;

    assert!(page.body.contains(r#"<body id="root"><article>post</article></body>"#), "{}", page.body);
}

#[tokio::test]
async fn nolayout_opts_out() {
    let dir = tempdir().unwrap();
    write(dir.path(), "_layout.html", "<html><body>{{ slot }}</body></html>");
    write(dir.path(), "raw.html", "{{ nolayout }}<p>raw</p>");
    let app = app(dir.path()).await;

    let page = app.get(PageRequest::get("/raw")).await;

    assert_eq!(page.body, "<p>raw</p>");
}

#[tokio::test]
async fn parameters_and_partials() {
    let dir = tempdir().unwrap();
    write(dir.path(), "docs+name.html", "{{ partial '_parts/title' }}<p><%= params.name %></p>");
    write(dir.path(), "_parts/title.html", "<h1>Docs</h1>");
    let app = app(dir.path()).await;

    let page = app.get(PageRequest::get("/docs/intro")).await;

    assert_eq!(page.status, 200);
    assert_eq!(page.body, "<h1>Docs</h1><p>intro</p>");
}

#[tokio::test]
async fn underscore_files_are_not_routes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "_layout.html", "<html><body>{{ slot }}</body></html>");
    write(dir.path(), "_parts/nav.html", "<nav></nav>");
    write(dir.path(), "about.html", "<p>about</p>");
    let app = app(dir.path()).await;

    assert_eq!(app.get(PageRequest::get("/_layout")).await.status, 404);
    assert_eq!(app.get(PageRequest::get("/_parts/nav")).await.status, 404);
    assert_eq!(app.get(PageRequest::get("/about")).await.status, 200);
}

#[tokio::test]
async fn missing_error_page_falls_back_to_builtin() {
    let dir = tempdir().unwrap();
    write(dir.path(), "index.html", "<p>home</p>");
    let app = app(dir.path()).await;

    let page = app.get(PageRequest::get("/nowhere")).await;

    assert_eq!(page.status, 404);
    assert!(page.body.contains("<h1>Not Found</h1>"), "{}", page.body);
    assert!(page.body.contains("/nowhere was not found"), "{}", page.body);
}

#[tokio::test]
async fn env_is_available_to_templates() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "nav.html",
        r#"<a id="link" href="/nav" s-active-path="/nav">nav</a><p><%= env.hostname %></p>"#,
    );
    let app = app(dir.path()).await;

    let mut request = PageRequest::get("/nav");
    request.hostname = "example.test".to_string();
    let page = app.get(request).await;

    assert!(page.body.contains(r#"<a id="link" href="/nav" class="active">"#), "{}", page.body);
    assert!(page.body.contains("<p>example.test</p>"), "{}", page.body);
}
