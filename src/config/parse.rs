//! Plan file parsing and discovery

use crate::config::types::PlanFile;
use crate::error::{ConfigError, ConfigResult, RplayError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default plan file names to search for
const PLAN_FILE_NAMES: &[&str] = &["rplay.yml", "rplay.yaml"];

/// Env file loaded next to the plan, if present
const ENV_FILE_NAME: &str = ".env";

/// Find the plan file by searching current and parent directories
pub fn find_plan_file() -> ConfigResult<PathBuf> {
    find_plan_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the plan file starting from a specific directory
pub fn find_plan_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in PLAN_FILE_NAMES {
            let plan_path = current_dir.join(file_name);
            searched_paths.push(plan_path.display().to_string());

            if plan_path.is_file() {
                return Ok(plan_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a plan file from a path
pub fn parse_plan_file(path: &Path) -> Result<PlanFile, RplayError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read file: {}", e)))?;

    parse_plan(&contents)
}

/// Parse a plan from a string
pub fn parse_plan(yaml: &str) -> Result<PlanFile, RplayError> {
    let plan: PlanFile = serde_yaml::from_str(yaml)?;
    Ok(plan)
}

/// Serialize a plan back to YAML
///
/// Parsing the output yields a plan equal to the input.
pub fn serialize_plan(plan: &PlanFile) -> Result<String, RplayError> {
    Ok(serde_yaml::to_string(plan)?)
}

/// Parse a plan with automatic file discovery
pub fn parse_plan_auto() -> Result<(PlanFile, PathBuf), RplayError> {
    let plan_path = find_plan_file()?;
    let plan = parse_plan_file(&plan_path)?;
    Ok((plan, plan_path))
}

/// Parse a duration such as `500ms`, `30s`, `5m`, `1h` or a bare number of seconds
pub fn parse_duration(duration_str: &str) -> ConfigResult<Duration> {
    let s = duration_str.trim();
    let invalid = || ConfigError::InvalidTimeout(duration_str.to_string());

    let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_millis(value.saturating_mul(unit_ms)))
}

/// Load `KEY=VALUE` pairs from the `.env` file next to the plan, if one exists
pub fn load_env_file(plan_path: &Path) -> ConfigResult<Vec<(String, String)>> {
    let base_dir = plan_path.parent().unwrap_or_else(|| Path::new("."));
    let env_path = base_dir.join(ENV_FILE_NAME);

    if !env_path.is_file() {
        return Ok(Vec::new());
    }

    let to_error = |e: dotenvy::Error| ConfigError::EnvFile {
        path: env_path.clone(),
        error: e.to_string(),
    };

    dotenvy::from_path_iter(&env_path)
        .map_err(to_error)?
        .map(|item| item.map_err(to_error))
        .collect()
}
