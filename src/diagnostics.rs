//! Environment report attached to `info` results and printed by `versions`

use crate::capability::{CapabilityProbe, KNOWN_DEPENDENCIES};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Build and host facts useful in bug reports
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub crate_version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpus: usize,
    pub generated_at: DateTime<Utc>,
    /// Backend dependency → usable in this process
    pub backends: Vec<(&'static str, bool)>,
}

impl Diagnostics {
    pub fn collect(probe: &dyn CapabilityProbe) -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpus: num_cpus::get(),
            generated_at: Utc::now(),
            backends: KNOWN_DEPENDENCIES
                .iter()
                .map(|dep| (*dep, probe.is_available(dep)))
                .collect(),
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INSTALLED VERSIONS")?;
        writeln!(f, "------------------")?;
        writeln!(f, "{}: {}", env!("CARGO_PKG_NAME"), self.crate_version)?;
        writeln!(f, "os: {}", self.os)?;
        writeln!(f, "arch: {}", self.arch)?;
        writeln!(f, "cpus: {}", self.cpus)?;
        writeln!(
            f,
            "generated: {}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(f)?;
        writeln!(f, "backends")?;
        write!(f, "--------")?;
        for (dep, available) in &self.backends {
            write!(f, "\n{}: {}", dep, if *available { "available" } else { "None" })?;
        }
        Ok(())
    }
}
