//! Bridge configuration
//!
//! `BridgeConfig` is the on-disk form (TOML). `StateOptions` is what a
//! single VM instance is created from; it is derived from the config and
//! can additionally carry host objects such as a shared map.
//!
//! ```toml
//! [limits]
//! steps = 100000
//! timeout_ms = 5000
//! hook_granularity = 1
//!
//! [libs]
//! open = true
//!
//! [builtins]
//! map_set = true
//! map_get = true
//! map_size_limit = 16
//!
//! [projection]
//! empty_table = "map"
//! max_depth = 32
//! ```

use std::path::Path;
use std::time::Duration;

use luabridge_sdk::{SharedMap, DEFAULT_MAP_SIZE_LIMIT};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default deadline applied by config files that do not set one
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default projection depth limit
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// How a table classified as `(true, 0)` is projected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyTablePolicy {
    /// `{}` becomes an empty map
    #[default]
    Map,
    /// `{}` becomes an empty array
    Array,
}

/// Value projection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionOptions {
    /// Policy for empty tables
    pub empty_table: EmptyTablePolicy,
    /// Maximum table nesting projected before giving up (guards cycles)
    pub max_depth: usize,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            empty_table: EmptyTablePolicy::Map,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// `[limits]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Step budget, 0 = unlimited
    pub steps: u64,
    /// Wall-clock budget in milliseconds, 0 = no deadline
    pub timeout_ms: u64,
    /// Fire the step hook every N VM instructions
    pub hook_granularity: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            steps: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            hook_granularity: 1,
        }
    }
}

/// `[libs]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibsConfig {
    /// Open the memory-safe Lua standard libraries
    pub open: bool,
}

impl Default for LibsConfig {
    fn default() -> Self {
        Self { open: true }
    }
}

/// `[builtins]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuiltinsConfig {
    /// Register `map_set`
    pub map_set: bool,
    /// Register `map_get` and `map_has`
    pub map_get: bool,
    /// Entry limit of the map created when no shared map is supplied
    pub map_size_limit: usize,
}

impl BuiltinsConfig {
    /// Whether any map builtin is enabled
    pub fn any(&self) -> bool {
        self.map_set || self.map_get
    }
}

impl Default for BuiltinsConfig {
    fn default() -> Self {
        Self {
            map_set: false,
            map_get: false,
            map_size_limit: DEFAULT_MAP_SIZE_LIMIT,
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Execution limits
    pub limits: LimitsConfig,
    /// Standard library loading
    pub libs: LibsConfig,
    /// Host builtins
    pub builtins: BuiltinsConfig,
    /// Value projection
    pub projection: ProjectionOptions,
}

impl BridgeConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Options for creating one VM instance
#[derive(Debug, Clone)]
pub struct StateOptions {
    /// Step budget, 0 = unlimited
    pub step_limit: u64,
    /// Wall-clock budget measured from creation
    pub timeout: Option<Duration>,
    /// Fire the step hook every N VM instructions (0 is treated as 1)
    pub hook_granularity: u32,
    /// Open the memory-safe standard libraries
    pub open_libs: bool,
    /// Map builtins to register
    pub builtins: BuiltinsConfig,
    /// Map the builtins operate on; a private one is created when `None`
    pub shared_map: Option<SharedMap>,
    /// Value projection
    pub projection: ProjectionOptions,
}

impl StateOptions {
    /// Set the step budget
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Set the wall-clock budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the hook granularity
    pub fn with_hook_granularity(mut self, every: u32) -> Self {
        self.hook_granularity = every;
        self
    }

    /// Choose whether the standard libraries are opened
    pub fn with_open_libs(mut self, open: bool) -> Self {
        self.open_libs = open;
        self
    }

    /// Enable the map builtins over `map`
    pub fn with_shared_map(mut self, map: SharedMap) -> Self {
        self.builtins.map_set = true;
        self.builtins.map_get = true;
        self.shared_map = Some(map);
        self
    }

    /// Set the projection options
    pub fn with_projection(mut self, projection: ProjectionOptions) -> Self {
        self.projection = projection;
        self
    }
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            step_limit: 0,
            timeout: None,
            hook_granularity: 1,
            open_libs: true,
            builtins: BuiltinsConfig::default(),
            shared_map: None,
            projection: ProjectionOptions::default(),
        }
    }
}

impl From<&BridgeConfig> for StateOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            step_limit: config.limits.steps,
            timeout: (config.limits.timeout_ms > 0)
                .then(|| Duration::from_millis(config.limits.timeout_ms)),
            hook_granularity: config.limits.hook_granularity,
            open_libs: config.libs.open,
            builtins: config.builtins.clone(),
            shared_map: None,
            projection: config.projection,
        }
    }
}
