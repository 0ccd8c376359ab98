use gotmpl_core::{ExecOptions, MissingKey, DEFAULT_MAX_DEPTH};

/// Name the foreign caller has always parsed under, so its diagnostics read
/// `template: ollama:...`.
pub const DEFAULT_TEMPLATE_NAME: &str = "ollama";

/// Render policy shared by every call made through one [`crate::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Name the template is parsed under; it prefixes every diagnostic.
    pub template_name: String,
    pub exec: ExecOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            template_name: DEFAULT_TEMPLATE_NAME.to_string(),
            exec: ExecOptions::default(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_string(name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize_nonzero(name: &str, default: usize) -> usize {
    env_string(name)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

fn env_missing_key(name: &str) -> MissingKey {
    let Some(raw) = env_string(name) else {
        return MissingKey::Default;
    };
    raw.parse().unwrap_or_else(|err: String| {
        tracing::warn!(var = name, value = %raw, %err, "ignoring invalid setting");
        MissingKey::Default
    })
}

impl BridgeConfig {
    /// Reads `GOTMPL_*` variables, falling back to the defaults for anything
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let max_output = env_u64("GOTMPL_MAX_OUTPUT_BYTES", 0);
        Self {
            template_name: env_string("GOTMPL_TEMPLATE_NAME")
                .unwrap_or_else(|| DEFAULT_TEMPLATE_NAME.to_string()),
            exec: ExecOptions {
                missing_key: env_missing_key("GOTMPL_MISSINGKEY"),
                max_depth: env_usize_nonzero("GOTMPL_MAX_DEPTH", DEFAULT_MAX_DEPTH),
                max_steps: env_u64("GOTMPL_MAX_STEPS", 0),
                max_output_bytes: usize::try_from(max_output).unwrap_or(usize::MAX),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unbounded() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.template_name, "ollama");
        assert_eq!(cfg.exec.max_steps, 0);
        assert_eq!(cfg.exec.max_output_bytes, 0);
        assert_eq!(cfg.exec.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(cfg.exec.missing_key, MissingKey::Default);
    }

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(env_u64("GOTMPL_TEST_UNSET_VARIABLE", 7), 7);
        assert_eq!(env_usize_nonzero("GOTMPL_TEST_UNSET_VARIABLE", 3), 3);
        assert_eq!(env_missing_key("GOTMPL_TEST_UNSET_VARIABLE"), MissingKey::Default);
    }

    #[test]
    fn helpers_parse_set_variables() {
        std::env::set_var("GOTMPL_TEST_HELPER_U64", " 42 ");
        std::env::set_var("GOTMPL_TEST_HELPER_ZERO", "0");
        std::env::set_var("GOTMPL_TEST_HELPER_JUNK", "lots");
        std::env::set_var("GOTMPL_TEST_HELPER_KEY", "zero");
        std::env::set_var("GOTMPL_TEST_HELPER_BAD_KEY", "sometimes");

        assert_eq!(env_u64("GOTMPL_TEST_HELPER_U64", 0), 42);
        assert_eq!(env_u64("GOTMPL_TEST_HELPER_JUNK", 9), 9);
        assert_eq!(env_usize_nonzero("GOTMPL_TEST_HELPER_U64", 1), 42);
        assert_eq!(env_usize_nonzero("GOTMPL_TEST_HELPER_ZERO", 5), 5);
        assert_eq!(env_usize_nonzero("GOTMPL_TEST_HELPER_JUNK", 5), 5);
        assert_eq!(env_missing_key("GOTMPL_TEST_HELPER_KEY"), MissingKey::Zero);
        assert_eq!(env_missing_key("GOTMPL_TEST_HELPER_BAD_KEY"), MissingKey::Default);
    }

    #[test]
    fn from_env_reads_every_setting() {
        let vars = [
            ("GOTMPL_TEMPLATE_NAME", "page"),
            ("GOTMPL_MAX_STEPS", "1000"),
            ("GOTMPL_MAX_OUTPUT_BYTES", "4096"),
            ("GOTMPL_MAX_DEPTH", "0"),
            ("GOTMPL_MISSINGKEY", "error"),
        ];
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        let cfg = BridgeConfig::from_env();
        for (name, _) in vars {
            std::env::remove_var(name);
        }

        assert_eq!(cfg.template_name, "page");
        assert_eq!(cfg.exec.max_steps, 1000);
        assert_eq!(cfg.exec.max_output_bytes, 4096);
        assert_eq!(cfg.exec.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(cfg.exec.missing_key, MissingKey::Error);
    }
}
