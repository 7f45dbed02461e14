//! Pipeline YAML loading with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::PipelineConfig;
use crate::errors::ConfigError;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitutes `${VAR_NAME}` references with environment variable values.
///
/// # Errors
///
/// [`ConfigError::MissingEnvVars`] naming every referenced variable that is
/// not set, so one pass surfaces them all.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = input.to_string();
    let mut missing: Vec<String> = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                if !missing.iter().any(|name| name == var_name) {
                    missing.push(var_name.to_string());
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(result)
    } else {
        Err(ConfigError::MissingEnvVars { names: missing })
    }
}

/// Parses a pipeline YAML string, substituting env references first.
///
/// # Errors
///
/// Substitution failures and YAML shape errors.
pub fn parse_pipeline_str(yaml: &str) -> Result<PipelineConfig, ConfigError> {
    let substituted = substitute_env_vars(yaml)?;
    let config: PipelineConfig = serde_yaml::from_str(&substituted)?;
    Ok(config)
}

/// Loads a pipeline YAML file.
///
/// # Errors
///
/// Read failures carry the path; see [`parse_pipeline_str`] for the rest.
pub fn load_pipeline(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pipeline_str(&content)
}
