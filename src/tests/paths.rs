use std::error::Error;

use http::{header, StatusCode};
use http_body_util::BodyExt;

use crate::{
    config::PROFILE_CONTENT_TYPE,
    server::path::{DocumentPath, Path, StaticPath},
    tests::support::{Bundle, LANDING_CSS, LANDING_INDEX},
    Document,
};

#[tokio::test]
async fn test_document_path_headers() -> Result<(), Box<dyn Error>> {
    let path = DocumentPath::new("/download", Document::from(br#"{"a":1}"#.as_slice()), "icons.mobileconfig")?;

    let response = path
        .handle("")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], PROFILE_CONTENT_TYPE);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=icons.mobileconfig"
    );

    let body = response
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert_eq!(body.as_ref(), br#"{"a":1}"#);

    Ok(())
}

#[tokio::test]
async fn test_empty_document_is_still_served() -> Result<(), Box<dyn Error>> {
    let path = DocumentPath::new("/download", Document::default(), "icons.mobileconfig")?;

    let response = path
        .handle("")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], PROFILE_CONTENT_TYPE);
    assert!(response
        .headers()
        .contains_key(header::CONTENT_DISPOSITION));

    let body = response
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert!(body.is_empty());

    Ok(())
}

#[test]
fn test_invalid_download_filename() {
    let result = DocumentPath::new("/download", Document::default(), "bad\nname");

    assert!(result.is_err());
}

#[test]
fn test_static_path_resolve() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    let landing = StaticPath::new("/mobileconfig", bundle.assets().join("mobileconfig"), "index.html");
    let directory = landing.directory();

    assert_eq!(landing.resolve(""), Some(directory.join("index.html")));
    assert_eq!(landing.resolve("/"), Some(directory.join("index.html")));
    assert_eq!(landing.resolve("/style.css"), Some(directory.join("style.css")));
    assert_eq!(landing.resolve("/img//icon.png"), Some(directory.join("img/icon.png")));

    assert_eq!(landing.resolve("/../../certs/localhost.pem"), None);
    assert_eq!(landing.resolve("/img/../style.css"), None);
    assert_eq!(landing.resolve("/./style.css"), None);
    assert_eq!(landing.resolve("/.hidden"), None);
    assert_eq!(landing.resolve("/a\\b"), None);
    assert_eq!(landing.resolve("/a\0b"), None);

    Ok(())
}

#[tokio::test]
async fn test_static_path_serves_files() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    let landing = StaticPath::new("/mobileconfig", bundle.assets().join("mobileconfig"), "index.html");

    let index = landing
        .handle("/")
        .await;
    assert_eq!(index.status(), StatusCode::OK);
    assert_eq!(index.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    let body = index
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert_eq!(body.as_ref(), LANDING_INDEX.as_bytes());

    let css = landing
        .handle("/style.css")
        .await;
    assert_eq!(css.status(), StatusCode::OK);
    assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");
    let body = css
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert_eq!(body.as_ref(), LANDING_CSS.as_bytes());

    Ok(())
}

#[tokio::test]
async fn test_static_path_directory_uses_index() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    let root = StaticPath::new("/", bundle.assets(), "index.html");

    let response = root
        .handle("mobileconfig")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert_eq!(body.as_ref(), LANDING_INDEX.as_bytes());

    Ok(())
}

#[tokio::test]
async fn test_static_path_missing_and_rejected() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    let landing = StaticPath::new("/mobileconfig", bundle.assets().join("mobileconfig"), "index.html");

    let missing = landing
        .handle("/missing.html")
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let escape = landing
        .handle("/../index.html")
        .await;
    assert_eq!(escape.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_mobileconfig_files_get_profile_type() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    std::fs::write(
        bundle
            .assets()
            .join("sample.mobileconfig"),
        b"<plist/>",
    )?;
    let root = StaticPath::new("/", bundle.assets(), "index.html");

    let response = root
        .handle("sample.mobileconfig")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], PROFILE_CONTENT_TYPE);

    Ok(())
}

#[test]
fn test_static_path_resolve_decodes_segments() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    let root = StaticPath::new("/", bundle.assets(), "index.html");
    let directory = root.directory();

    assert_eq!(root.resolve("my%20icon.png"), Some(directory.join("my icon.png")));
    assert_eq!(root.resolve("mobileconfig/%69ndex.html"), Some(directory.join("mobileconfig/index.html")));

    assert_eq!(root.resolve("%2e%2e/certs/localhost.pem"), None);
    assert_eq!(root.resolve("mobileconfig/%2E%2E/%2E%2E/etc"), None);
    assert_eq!(root.resolve("%2ehidden"), None);
    assert_eq!(root.resolve("mobileconfig%2F..%2Fsecret"), None);
    assert_eq!(root.resolve("a%5Cb"), None);
    assert_eq!(root.resolve("a%00b"), None);
    assert_eq!(root.resolve("%ff.png"), None);

    Ok(())
}

#[tokio::test]
async fn test_static_path_serves_encoded_name() -> Result<(), Box<dyn Error>> {
    let bundle = Bundle::new()?;
    std::fs::write(
        bundle
            .assets()
            .join("my icon.png"),
        b"png",
    )?;
    let root = StaticPath::new("/", bundle.assets(), "index.html");

    let response = root
        .handle("my%20icon.png")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = response
        .into_body()
        .collect()
        .await?
        .to_bytes();
    assert_eq!(body.as_ref(), b"png");

    Ok(())
}
