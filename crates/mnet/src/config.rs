//! Process-wide configuration surface (spec §6), readable/writable at runtime.
//!
//! The `from_ini` parser follows the same hand-rolled line-oriented style as
//! `styrene-rns-transport::config::Config::from_ini`: no external INI crate,
//! just a `[section]` + `key = value` scan.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub hostname: String,
    pub port: u16,
    pub route: bool,
    pub route_time: Duration,
    pub retransmit_time: Duration,
    pub drop_time: Duration,
    /// `None` means "derive from the minimum device MTU minus header
    /// overhead"; `Some(n)` is an explicit override (`debugSetSmallMTU`).
    pub mtu_override: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: derive_hostname(),
            port: 2048,
            route: true,
            route_time: Duration::from_secs(30),
            retransmit_time: Duration::from_secs(3),
            drop_time: Duration::from_secs(12),
            mtu_override: None,
        }
    }
}

fn derive_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "mnet-host".to_string())
}

impl Config {
    /// Parses the `[mnet]` section of an ini-style config file, leaving
    /// unspecified fields at their defaults. Unknown keys and sections are
    /// ignored; malformed numeric values are ignored (the default stands).
    pub fn from_ini(ini: &str) -> Self {
        let mut config = Self::default();
        let mut in_mnet_section = false;

        for raw_line in ini.lines() {
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = &line[1..line.len() - 1];
                in_mnet_section = section.trim().eq_ignore_ascii_case("mnet");
                continue;
            }

            if !in_mnet_section {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "hostname" => config.hostname = value.to_string(),
                "port" => {
                    if let Ok(port) = value.parse() {
                        config.port = port;
                    }
                }
                "route" => {
                    if let Ok(route) = value.parse() {
                        config.route = route;
                    }
                }
                "routeTime" => {
                    if let Ok(secs) = value.parse() {
                        config.route_time = Duration::from_secs(secs);
                    }
                }
                "retransmitTime" => {
                    if let Ok(secs) = value.parse() {
                        config.retransmit_time = Duration::from_secs(secs);
                    }
                }
                "dropTime" => {
                    if let Ok(secs) = value.parse() {
                        config.drop_time = Duration::from_secs(secs);
                    }
                }
                "mtu" => {
                    if let Ok(mtu) = value.parse() {
                        config.mtu_override = Some(mtu);
                    }
                }
                _ => {}
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_ini_overrides_only_named_fields() {
        let ini = "[mnet]\nhostname = h1\nretransmitTime = 5\n";
        let config = Config::from_ini(ini);
        assert_eq!(config.hostname, "h1");
        assert_eq!(config.retransmit_time, Duration::from_secs(5));
        assert_eq!(config.drop_time, Duration::from_secs(12));
    }

    #[test]
    fn from_ini_ignores_other_sections() {
        let ini = "[other]\nhostname = wrong\n[mnet]\nhostname = right\n";
        assert_eq!(Config::from_ini(ini).hostname, "right");
    }
}
