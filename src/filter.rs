use crate::config::ShipperConfig;
use crate::record::Severity;

/// Target prefix of this crate's own diagnostics. Events under it are
/// never shipped, otherwise a failing send would log about itself forever.
pub const SELF_TARGET: &str = "tracing_log_shipper";

/// Category-aware level filter applied at log-call time.
///
/// An event passes when its severity reaches `min_level`. Events from
/// noisy framework targets (`hyper`, `reqwest`, ...) must additionally
/// reach `noisy_min_level`.
#[derive(Debug, Clone)]
pub struct LevelFilter {
    min_level: Severity,
    noisy_targets: Vec<String>,
    noisy_min_level: Severity,
}

impl LevelFilter {
    pub fn new(min_level: Severity, noisy_targets: Vec<String>, noisy_min_level: Severity) -> Self {
        Self {
            min_level,
            noisy_targets,
            noisy_min_level,
        }
    }

    pub fn from_config(config: &ShipperConfig) -> Self {
        Self::new(config.min_level, config.noisy_targets.clone(), config.noisy_min_level)
    }

    pub fn enabled(&self, target: &str, level: Severity) -> bool {
        if is_under(target, SELF_TARGET) {
            return false;
        }
        if level < self.min_level {
            return false;
        }
        if self.noisy_targets.iter().any(|prefix| is_under(target, prefix)) {
            return level >= self.noisy_min_level;
        }
        true
    }
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self::from_config(&ShipperConfig::default())
    }
}

// `hyper` matches `hyper` and `hyper::proto`, not `hyperlocal`.
fn is_under(target: &str, prefix: &str) -> bool {
    target == prefix
        || target
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with("::"))
            .unwrap_or(false)
}
