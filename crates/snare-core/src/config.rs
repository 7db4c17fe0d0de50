//! # Engine Configuration
//!
//! Tunables for a [`Session`](crate::session::Session). Defaults match what a
//! typical x86-64 host provides; every value can be overridden through the
//! environment:
//!
//! | variable                      | field                       | default  |
//! |-------------------------------|-----------------------------|----------|
//! | `SNARE_WATCHPOINT_SLOTS`      | `hardware_watchpoint_slots` | 4        |
//! | `SNARE_SUMMARY_LIMIT`         | `max_summary_length`        | 1024     |
//! | `SNARE_MAX_CHILDREN`          | `max_children_rendered`     | 256      |
//! | `SNARE_MAX_MEMORY_READ`       | `max_memory_read`           | 1024     |
//! | `SNARE_MAX_STEP_INSTRUCTIONS` | `max_step_instructions`     | 100000   |
//! | `SNARE_MOVE_TO_NEAREST_CODE`  | `move_to_nearest_code`      | true     |

use std::env;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, SnareError};

/// Environment variable overriding [`EngineConfig::hardware_watchpoint_slots`].
pub const ENV_WATCHPOINT_SLOTS: &str = "SNARE_WATCHPOINT_SLOTS";
/// Environment variable overriding [`EngineConfig::max_summary_length`].
pub const ENV_SUMMARY_LIMIT: &str = "SNARE_SUMMARY_LIMIT";
/// Environment variable overriding [`EngineConfig::max_children_rendered`].
pub const ENV_MAX_CHILDREN: &str = "SNARE_MAX_CHILDREN";
/// Environment variable overriding [`EngineConfig::max_memory_read`].
pub const ENV_MAX_MEMORY_READ: &str = "SNARE_MAX_MEMORY_READ";
/// Environment variable overriding [`EngineConfig::max_step_instructions`].
pub const ENV_MAX_STEP_INSTRUCTIONS: &str = "SNARE_MAX_STEP_INSTRUCTIONS";
/// Environment variable overriding [`EngineConfig::move_to_nearest_code`].
pub const ENV_MOVE_TO_NEAREST_CODE: &str = "SNARE_MOVE_TO_NEAREST_CODE";

/// Engine tunables
///
/// ## Example
///
/// ```rust
/// use snare_core::config::EngineConfig;
///
/// let config = EngineConfig::from_lookup(|key| match key {
///     "SNARE_WATCHPOINT_SLOTS" => Some("2".to_string()),
///     _ => None,
/// })?;
/// assert_eq!(config.hardware_watchpoint_slots, 2);
/// assert!(config.move_to_nearest_code);
/// # Ok::<(), snare_core::error::SnareError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig
{
    /// Number of data traps the target can arm at once.
    pub hardware_watchpoint_slots: usize,
    /// Longest C-string summary read from the inferior, in bytes.
    pub max_summary_length: usize,
    /// Children rendered per aggregate by the recursive formatter.
    pub max_children_rendered: usize,
    /// Largest formatted memory read, in bytes.
    pub max_memory_read: usize,
    /// Upper bound on instructions executed by one step-over.
    pub max_step_instructions: usize,
    /// Default for moving line breakpoints to the next line with code.
    pub move_to_nearest_code: bool,
}

impl Default for EngineConfig
{
    fn default() -> Self
    {
        Self {
            hardware_watchpoint_slots: 4,
            max_summary_length: 1024,
            max_children_rendered: 256,
            max_memory_read: 1024,
            max_step_instructions: 100_000,
            move_to_nearest_code: true,
        }
    }
}

impl EngineConfig
{
    /// Defaults overridden by the `SNARE_*` environment variables.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if a variable is set to something that does not parse.
    pub fn from_env() -> Result<Self>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if a value does not parse, or if a size limit is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        override_with(&lookup, ENV_WATCHPOINT_SLOTS, &mut config.hardware_watchpoint_slots)?;
        override_with(&lookup, ENV_SUMMARY_LIMIT, &mut config.max_summary_length)?;
        override_with(&lookup, ENV_MAX_CHILDREN, &mut config.max_children_rendered)?;
        override_with(&lookup, ENV_MAX_MEMORY_READ, &mut config.max_memory_read)?;
        override_with(&lookup, ENV_MAX_STEP_INSTRUCTIONS, &mut config.max_step_instructions)?;
        if let Some(raw) = lookup(ENV_MOVE_TO_NEAREST_CODE) {
            config.move_to_nearest_code = parse_bool(ENV_MOVE_TO_NEAREST_CODE, &raw)?;
        }

        for (name, value) in [
            (ENV_SUMMARY_LIMIT, config.max_summary_length),
            (ENV_MAX_MEMORY_READ, config.max_memory_read),
            (ENV_MAX_STEP_INSTRUCTIONS, config.max_step_instructions),
        ] {
            if value == 0 {
                return Err(SnareError::invalid_argument(format!("{name} must be greater than zero")));
            }
        }

        debug!(?config, "engine configuration resolved");
        Ok(config)
    }
}

fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| SnareError::invalid_argument(format!("{key}: cannot parse '{raw}'")))?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool>
{
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SnareError::invalid_argument(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String>
    {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_defaults_without_overrides()
    {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.hardware_watchpoint_slots, 4);
    }

    #[test]
    fn test_overrides_are_applied()
    {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("SNARE_WATCHPOINT_SLOTS", "2"),
            ("SNARE_MAX_MEMORY_READ", " 64 "),
            ("SNARE_MOVE_TO_NEAREST_CODE", "off"),
        ]))
        .unwrap();
        assert_eq!(config.hardware_watchpoint_slots, 2);
        assert_eq!(config.max_memory_read, 64);
        assert!(!config.move_to_nearest_code);
    }

    #[test]
    fn test_invalid_number_is_rejected()
    {
        let err = EngineConfig::from_lookup(lookup_from(&[("SNARE_SUMMARY_LIMIT", "lots")])).unwrap_err();
        assert!(matches!(err, SnareError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_limit_is_rejected()
    {
        let err = EngineConfig::from_lookup(lookup_from(&[("SNARE_MAX_STEP_INSTRUCTIONS", "0")])).unwrap_err();
        assert!(err.to_string().contains("SNARE_MAX_STEP_INSTRUCTIONS"));
    }

    #[test]
    fn test_invalid_bool_is_rejected()
    {
        assert!(EngineConfig::from_lookup(lookup_from(&[("SNARE_MOVE_TO_NEAREST_CODE", "maybe")])).is_err());
    }
}
