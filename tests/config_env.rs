use pawpost::config::{remote_timeout_from_env, BackendConfig, ConfigKey, REMOTE_TIMEOUT};
use serial_test::serial;
use std::time::Duration;

fn clear() {
    for k in ConfigKey::ALL {
        std::env::remove_var(k.env_var());
    }
    std::env::remove_var("PAWPOST_REMOTE_TIMEOUT_MS");
}

#[test]
#[serial]
fn reads_process_environment() {
    clear();
    assert!(!BackendConfig::from_env().is_configured());

    for k in ConfigKey::ALL {
        std::env::set_var(k.env_var(), "x");
    }
    std::env::remove_var("PAWPOST_MESSAGING_SENDER_ID");
    let cfg = BackendConfig::from_env();
    assert!(cfg.is_configured());
    assert_eq!(cfg.get(ConfigKey::MessagingSenderId), None);
    clear();
}

#[test]
#[serial]
fn timeout_override() {
    clear();
    assert_eq!(remote_timeout_from_env(), REMOTE_TIMEOUT);
    std::env::set_var("PAWPOST_REMOTE_TIMEOUT_MS", "250");
    assert_eq!(remote_timeout_from_env(), Duration::from_millis(250));
    std::env::set_var("PAWPOST_REMOTE_TIMEOUT_MS", "soon");
    assert_eq!(remote_timeout_from_env(), REMOTE_TIMEOUT);
    clear();
}
