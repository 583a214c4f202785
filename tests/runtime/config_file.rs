use devtunnel::Config;
use tempfile::TempDir;

#[test]
fn partial_config_file_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
machine_name = "studio"

[routed]
domain = "dev.example.com"

[overlay]
funnel_port = 8443
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.machine_name.as_deref(), Some("studio"));
    assert_eq!(config.routed.domain(), Some("dev.example.com"));
    assert_eq!(config.routed.binary, "cloudflared");
    assert_eq!(config.overlay.funnel_port, 8443);
    assert_eq!(config.quick.poll_attempts, 30);
    assert_eq!(config.lock.timeout_ms, 10_000);
    config.validate().unwrap();
}

#[test]
fn unsupported_funnel_port_fails_validation() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[overlay]\nfunnel_port = 8080\n").unwrap();

    let config = Config::load_from(&path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("funnel_port"));
}
