use std::fs;
use tempfile::TempDir;

use s2d3::config::{self, Addressing};

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
default_profile: minio
profiles:
  aws:
    access_key_id: AKIATEST
    secret_access_key: secrettest
    session_token: token-1
    domain: s3.eu-west-1.amazonaws.com
    region: eu-west-1
    bucket: test-bucket
  minio:
    access_key_id: minio
    secret_access_key: minio123
    domain: localhost:9000
    protocol: http
    path_buckets: true
    signature_version: 2
    socks5_proxy: 127.0.0.1:1080
    skip_system_cas: true
    insecure_skip_verify: true
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("s2d3.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = config::load_from_yaml(&config_path).unwrap();
    assert_eq!(config.profiles.len(), 2);

    let aws = config.get_profile(Some("aws")).unwrap();
    assert_eq!(aws.region, "eu-west-1");
    assert_eq!(aws.bucket.as_deref(), Some("test-bucket"));
    assert_eq!(aws.credentials().session_token.as_deref(), Some("token-1"));
    assert_eq!(aws.addressing(), Addressing::VirtualHost);

    let minio = config::load_profile(&config_path, None).unwrap();
    assert_eq!(minio.domain, "localhost:9000");
    assert_eq!(minio.signature_version, 2);
    assert_eq!(minio.addressing(), Addressing::Path);
    assert_eq!(minio.socks5_proxy.as_deref(), Some("127.0.0.1:1080"));
    assert!(minio.skip_system_cas);
    assert!(minio.insecure_skip_verify);
}

#[test]
fn test_unknown_signature_version_rejected() {
    let yaml = r#"
profiles:
  broken:
    access_key_id: a
    secret_access_key: b
    domain: s3.example.com
    signature_version: 3
"#;
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("s2d3.yaml");
    fs::write(&config_path, yaml).unwrap();

    let err = config::load_from_yaml(&config_path).unwrap_err();
    assert!(format!("{:#}", err).contains("signature version 3"));
}

#[test]
fn test_missing_profile() {
    let yaml = r#"
profiles:
  one:
    access_key_id: a
    secret_access_key: b
    domain: s3.example.com
"#;
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("s2d3.yaml");
    fs::write(&config_path, yaml).unwrap();

    // A lone profile is picked without naming it
    assert_eq!(config::load_profile(&config_path, None).unwrap().domain, "s3.example.com");

    let err = config::load_profile(&config_path, Some("two")).unwrap_err();
    assert!(err.to_string().contains("'two'"));
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = config::load_from_yaml(temp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
