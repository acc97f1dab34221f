use std::{error::Error, net::IpAddr, path::Path, time::Duration};

use crate::{
    config::ServerConfig,
    errors::{ConfigError, ServerError},
    server::conn::listener::{resolve_interface, ListenerSettings},
};

#[test]
fn test_default_config() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::builder().build()?;

    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.port(), 9000);
    assert_eq!(config.interface(), "localhost");
    assert_eq!(config.concurrency(), 4);
    assert_eq!(config.drain_timeout(), Duration::from_secs(2));
    assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
    assert_eq!(config.landing_path(), Path::new("assets/mobileconfig"));
    assert_eq!(config.identity_path(), Path::new("certs/localhost.pem"));
    assert_eq!(config.ca_path(), Path::new("certs/ca.der"));
    assert_eq!(config.trusted_host(), "localhost");
    assert_eq!(config.download_filename(), "icons.mobileconfig");

    Ok(())
}

#[test]
fn test_builder_overrides() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::builder()
        .port(8443)
        .interface("127.0.0.1")
        .concurrency(8)
        .drain_timeout(Duration::from_millis(250))
        .assets_dir("/srv/bundle")
        .landing_dir("install")
        .certs_dir("/srv/tls")
        .identity_file("server.pem")
        .download_filename("clips.mobileconfig")
        .build()?;

    assert_eq!(config.port(), 8443);
    assert_eq!(config.interface(), "127.0.0.1");
    assert_eq!(config.concurrency(), 8);
    assert_eq!(config.drain_timeout(), Duration::from_millis(250));
    assert_eq!(config.landing_path(), Path::new("/srv/bundle/install"));
    assert_eq!(config.identity_path(), Path::new("/srv/tls/server.pem"));
    assert_eq!(config.download_filename(), "clips.mobileconfig");

    Ok(())
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let result = ServerConfig::builder()
        .concurrency(0)
        .build();

    assert!(matches!(result, Err(ServerError::Config(ConfigError::Server(_)))));
}

#[test]
fn test_empty_download_filename_is_rejected() {
    let result = ServerConfig::builder()
        .download_filename("")
        .build();

    assert!(result.is_err());
}

#[test]
fn test_yaml_config() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::from_yaml(
        r#"
port: 9100
assets_dir: /opt/profile-server/assets
drain_timeout_ms: 750
"#,
    )?;

    assert_eq!(config.port(), 9100);
    assert_eq!(config.assets_dir(), Path::new("/opt/profile-server/assets"));
    assert_eq!(config.drain_timeout(), Duration::from_millis(750));
    assert_eq!(config.interface(), "localhost");
    assert_eq!(config.index_file(), "index.html");

    Ok(())
}

#[test]
fn test_yaml_rejects_unknown_keys() {
    let result = ServerConfig::from_yaml("port: 9000\nwildcard: true\n");

    assert!(matches!(result, Err(ServerError::Config(ConfigError::File(_)))));
}

#[test]
fn test_yaml_file_missing() {
    let result = ServerConfig::from_yaml_file("/nonexistent/profile-server.yaml");

    assert!(matches!(result, Err(ServerError::Config(ConfigError::File(_)))));
}

#[test]
fn test_resolve_interface() -> Result<(), Box<dyn Error>> {
    assert_eq!(resolve_interface("localhost")?, "127.0.0.1".parse::<IpAddr>()?);
    assert_eq!(resolve_interface("::1")?, "::1".parse::<IpAddr>()?);
    assert!(matches!(resolve_interface("not a host"), Err(ServerError::Bind(_))));

    Ok(())
}

#[test]
fn test_listener_settings_from_config() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::builder()
        .concurrency(2)
        .handshake_timeout(Duration::from_secs(3))
        .build()?;

    let settings = ListenerSettings::from_config(&config);

    assert_eq!(settings.concurrency, 2);
    assert_eq!(settings.drain_timeout, Duration::from_secs(2));
    assert_eq!(settings.handshake_timeout, Duration::from_secs(3));

    Ok(())
}
