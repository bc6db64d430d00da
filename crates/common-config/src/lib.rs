//! Shared configuration helpers for the demo services.
//!
//! There are no configuration files: every setting is a compiled-in default
//! with an optional environment-variable override.

use std::env;

/// Resolve the listen port for a service from an environment variable.
///
/// Falls back to the provided default when the variable is missing or does
/// not parse as a `u16`.
pub fn service_port(var: &str, default: u16) -> u16 {
    match env::var(var) {
        Ok(value) => value
            .parse::<u16>()
            .inspect_err(|error| {
                tracing::warn!(%var, %value, %error, "invalid port override, using default");
            })
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Resolve a string setting from an environment variable.
///
/// An empty override is treated as unset so a blank variable cannot wipe
/// out a required default.
pub fn env_string(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(value) if !value.is_empty() => value,
        Ok(_) => {
            tracing::warn!(%var, "empty override, using default");
            default.to_string()
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_when_unset() {
        assert_eq!(service_port("PORT_VAR_THAT_IS_NOT_SET", 4000), 4000);
    }

    #[test]
    fn port_falls_back_on_garbage() {
        env::set_var("COMMON_CONFIG_TEST_BAD_PORT", "not-a-port");
        assert_eq!(service_port("COMMON_CONFIG_TEST_BAD_PORT", 3000), 3000);
        env::remove_var("COMMON_CONFIG_TEST_BAD_PORT");
    }

    #[test]
    fn string_override_wins_when_present() {
        env::set_var("COMMON_CONFIG_TEST_STRING", "http://127.0.0.1:9999");
        assert_eq!(
            env_string("COMMON_CONFIG_TEST_STRING", "http://127.0.0.1:4000"),
            "http://127.0.0.1:9999"
        );
        env::remove_var("COMMON_CONFIG_TEST_STRING");
    }

    #[test]
    fn empty_string_override_is_ignored() {
        env::set_var("COMMON_CONFIG_TEST_EMPTY", "");
        assert_eq!(env_string("COMMON_CONFIG_TEST_EMPTY", "fallback"), "fallback");
        env::remove_var("COMMON_CONFIG_TEST_EMPTY");
    }
}
