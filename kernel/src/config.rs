// SPDX-License-Identifier: MPL-2.0

//! Tunables of the identity subsystem.

use getset::{CopyGetters, Setters};
use log::LevelFilter;

use crate::{
    cache::{CACHE_MAX_CEILING, DEFAULT_CACHE_MAX},
    logger::parse_log_level,
    prelude::*,
};

/// The configuration of the identity subsystem.
///
/// It is built from defaults and a command-line-style string of
/// `key=value` tokens, see [`KauthConfig::from_cmdline`].
#[derive(Debug, Clone, Copy, CopyGetters, Setters)]
#[get_copy = "pub"]
#[set = "pub"]
pub struct KauthConfig {
    /// How long a request waits for the resolver.
    resolver_timeout: Duration,
    /// How long a request waits for a resolver to register when none is.
    no_resolver_grace: Duration,
    identity_cache_max: usize,
    group_cache_max: usize,
    /// Whether translations go to the user-space resolver. Without it,
    /// GUIDs are synthesized from UIDs and GIDs.
    ext_resolver: bool,
    /// Whether supplementary groups come from the resolver.
    ds_supgroups: bool,
    /// Whether displacing a group by an effective-group change opts the
    /// credential out of external group membership.
    displacement_opts_out: bool,
    log_level: LevelFilter,
}

impl Default for KauthConfig {
    fn default() -> Self {
        Self {
            resolver_timeout: Duration::from_secs(30),
            no_resolver_grace: Duration::from_millis(500),
            identity_cache_max: DEFAULT_CACHE_MAX,
            group_cache_max: DEFAULT_CACHE_MAX,
            ext_resolver: true,
            ds_supgroups: true,
            displacement_opts_out: true,
            log_level: LevelFilter::Warn,
        }
    }
}

impl KauthConfig {
    /// Parses whitespace-separated `key=value` tokens over the defaults.
    ///
    /// Keys may carry a `kauth.` prefix. Unknown keys are ignored.
    pub fn from_cmdline(cmdline: &str) -> Result<Self> {
        let mut config = Self::default();
        for arg in cmdline.split_whitespace() {
            let Some((key, value)) = arg.split_once('=') else {
                return_errno_with_message!(Errno::EINVAL, "a configuration token is not key=value");
            };
            let key = key.strip_prefix("kauth.").unwrap_or(key);
            match key {
                "resolver_timeout" => {
                    config.resolver_timeout = Duration::from_secs(value.parse::<u32>()? as u64);
                }
                "no_resolver_grace_ms" => {
                    config.no_resolver_grace = Duration::from_millis(value.parse()?);
                }
                "identity_cache_max" => config.identity_cache_max = parse_cache_max(value)?,
                "group_cache_max" => config.group_cache_max = parse_cache_max(value)?,
                "ext_resolver" => config.ext_resolver = parse_bool(value)?,
                "ds_supgroups" => config.ds_supgroups = parse_bool(value)?,
                "displacement_opts_out" => config.displacement_opts_out = parse_bool(value)?,
                "log_level" => config.log_level = parse_log_level(value),
                _ => warn!("kauth: ignoring unknown configuration key {}", key),
            }
        }
        Ok(config)
    }
}

fn parse_cache_max(value: &str) -> Result<usize> {
    let max: usize = value.parse()?;
    if max > CACHE_MAX_CEILING {
        return_errno_with_message!(Errno::EINVAL, "the cache bound is too large");
    }
    Ok(max)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => return_errno_with_message!(Errno::EINVAL, "not a boolean"),
    }
}
