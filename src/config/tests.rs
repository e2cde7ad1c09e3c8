//! Unit tests for configuration validation.

use super::*;
use crate::test_support::{provider_config, transport_config};
use rstest::rstest;

#[rstest]
fn provider_config_accepts_complete_values() {
    assert!(provider_config("/srv/scripts").validate().is_ok());
}

#[rstest]
#[case("DROPSHIP_CLIENT_ID", |cfg: &mut ProviderConfig| cfg.client_id.clear())]
#[case("DROPSHIP_API_KEY", |cfg: &mut ProviderConfig| cfg.api_key = String::from("  "))]
#[case("DROPSHIP_SCRIPTS_DIR", |cfg: &mut ProviderConfig| cfg.scripts_dir.clear())]
#[case("DROPSHIP_SSH_KEY_ID", |cfg: &mut ProviderConfig| cfg.ssh_key_id.clear())]
fn provider_config_names_missing_env_var(
    #[case] env_var: &str,
    #[case] blank: fn(&mut ProviderConfig),
) {
    let mut cfg = provider_config("/srv/scripts");
    blank(&mut cfg);

    let err = cfg.validate().expect_err("blank field must be rejected");
    let ConfigError::MissingField(ref message) = err else {
        panic!("expected MissingField, got {err:?}");
    };
    assert!(message.contains(env_var), "message: {message}");
    assert!(message.contains("dropship.toml"), "message: {message}");
}

#[rstest]
fn provider_config_rejects_zero_concurrency() {
    let cfg = ProviderConfig {
        concurrency: 0,
        ..provider_config("/srv/scripts")
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue(_))));
}

#[rstest]
fn transport_config_requires_key_paths() {
    let cfg = TransportConfig {
        private_key_path: String::new(),
        ..transport_config()
    };
    let err = cfg.validate().expect_err("private key is required");
    assert!(
        err.to_string().contains("DROPSHIP_SSH_PRIVATE_KEY_PATH"),
        "unexpected error: {err}"
    );

    let cfg = TransportConfig {
        public_key_path: String::from(" "),
        ..transport_config()
    };
    let err = cfg.validate().expect_err("public key is required");
    assert!(
        err.to_string().contains("DROPSHIP_SSH_PUBLIC_KEY_PATH"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn transport_config_rejects_zero_port() {
    let cfg = TransportConfig {
        port: 0,
        ..transport_config()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue(_))));
}

#[rstest]
fn expand_tilde_leaves_absolute_paths_alone() {
    assert_eq!(expand_tilde("/etc/keys/id"), "/etc/keys/id");
}

#[rstest]
fn scripts_path_trims_whitespace() {
    let cfg = provider_config("  /srv/scripts  ");
    assert_eq!(cfg.scripts_path(), Utf8PathBuf::from("/srv/scripts"));
}
