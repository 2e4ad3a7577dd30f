use std::cell::Cell;

use crate::credentials::CredentialStore;
use crate::settings::{load_settings, parse_settings, ServerConfig};

const SETTINGS: &str = r#"
full_name: Jane Doe
email_address: jane@example.com
incoming:
  host: imap.example.com
  port: 993
  user_name: jane
  use_ssl: true
outgoing:
  host: smtp.example.com
  port: 587
  user_name: jane
  password: hunter2
  start_ssl: true
"#;

#[test]
fn test_settings_defaults() {
    let config = parse_settings(SETTINGS).unwrap();

    assert_eq!(config.mailbox, "INBOX");
    assert!(config.identify);
    assert_eq!(config.incoming.port, 993);
    assert!(config.incoming.use_ssl);
    assert!(!config.incoming.start_ssl);
    assert_eq!(config.incoming.password, None);
    assert_eq!(config.outgoing.password.as_deref(), Some("hunter2"));
    assert!(config.outgoing.start_ssl);
}

#[test]
fn test_missing_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_settings(dir.path().join("absent.yaml")).is_err());

    let path = dir.path().join("settings.yaml");
    std::fs::write(&path, SETTINGS).unwrap();
    assert_eq!(load_settings(&path).unwrap().full_name, "Jane Doe");
}

#[test]
fn test_password_encryption_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path());

    let encrypted = store.encrypt_password("correct horse").unwrap();
    assert_ne!(encrypted, "correct horse");
    assert_eq!(store.decrypt_password(&encrypted).unwrap(), "correct horse");
    assert!(store.decrypt_password("dG9vIHNob3J0").is_err());
}

#[test]
fn test_password_is_prompted_once_then_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path());
    let prompts = Cell::new(0);
    let prompt = || {
        prompts.set(prompts.get() + 1);
        Ok("s3cret".to_string())
    };

    assert_eq!(store.password_or_else("jane", prompt).unwrap(), "s3cret");
    assert_eq!(store.password_or_else("jane", prompt).unwrap(), "s3cret");
    assert_eq!(prompts.get(), 1);

    let mut server = ServerConfig {
        host: "imap.example.com".to_string(),
        port: 993,
        user_name: "jane".to_string(),
        password: None,
        use_ssl: true,
        start_ssl: false,
    };
    store.resolve(&mut server).unwrap();
    assert_eq!(server.password.as_deref(), Some("s3cret"));
}
