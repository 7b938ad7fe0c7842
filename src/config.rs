use anyhow::{anyhow, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use std::net::SocketAddr;
use std::path::PathBuf;

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

/// Process-wide configuration, parsed once from the `serve` subcommand's
/// arguments at startup.
pub struct Config {
    pub service_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub packages_dir: PathBuf,
    pub worker_pool_min: usize,
    pub worker_pool_max: usize,
    pub gateway_default_timeout_secs: u64,
    pub connect_max_body_bytes: usize,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let service_addr = bind_address(matches, "service-addr", "service-port")?;
        let admin_addr = bind_address(matches, "admin-addr", "admin-port")?;

        let packages_dir = matches
            .get_one::<String>("packages-dir")
            .map(PathBuf::from)
            .expect("clap default value for packages-dir");

        let worker_pool_min = matches
            .get_one::<String>("worker-pool-min")
            .expect("clap default value for worker-pool-min")
            .parse::<usize>()
            .map_err(|e| anyhow!("invalid --worker-pool-min: {e}"))?;

        let worker_pool_max = matches
            .get_one::<String>("worker-pool-max")
            .map_or_else(num_cpus::get, |v| {
                v.parse::<usize>()
                    .expect("error parsing --worker-pool-max")
            })
            .max(worker_pool_min.max(1));

        let gateway_default_timeout_secs = matches
            .get_one::<String>("gateway-timeout-secs")
            .expect("clap default value for gateway-timeout-secs")
            .parse::<u64>()
            .map_err(|e| anyhow!("invalid --gateway-timeout-secs: {e}"))?;

        let connect_max_body_bytes = matches
            .get_one::<String>("connect-max-body-bytes")
            .expect("clap default value for connect-max-body-bytes")
            .parse::<usize>()
            .map_err(|e| anyhow!("invalid --connect-max-body-bytes: {e}"))?;

        let log_level = matches
            .get_one::<String>("log-level")
            .expect("clap default value for log-level")
            .to_owned();
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("clap default value for log-fmt")
            .to_owned();
        let log_no_color = *matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value");

        Ok(Self {
            service_addr,
            admin_addr,
            packages_dir,
            worker_pool_min,
            worker_pool_max,
            gateway_default_timeout_secs,
            connect_max_body_bytes,
            log_level,
            log_fmt,
            log_no_color,
        })
    }
}

fn bind_address(matches: &ArgMatches, addr_id: &str, port_id: &str) -> Result<SocketAddr> {
    format!(
        "{}:{}",
        matches.get_one::<String>(addr_id).unwrap(),
        matches.get_one::<String>(port_id).unwrap()
    )
    .parse()
    .map_err(|e| anyhow!("error parsing {addr_id}/{port_id}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;

    #[test]
    fn defaults_parse_cleanly() {
        let cli = cli::build_cli();
        let matches = cli
            .try_get_matches_from(["okra-runtime", "serve"])
            .unwrap();
        let serve_matches = matches.subcommand_matches("serve").unwrap();
        let config = Config::from_args(serve_matches).unwrap();

        assert_eq!(config.service_addr.port(), 8080);
        assert_eq!(config.admin_addr.port(), 8081);
        assert_eq!(config.worker_pool_min, 1);
        assert!(config.worker_pool_max >= 1);
        assert_eq!(config.connect_max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn worker_pool_max_is_never_below_min() {
        let cli = cli::build_cli();
        let matches = cli
            .try_get_matches_from([
                "okra-runtime",
                "serve",
                "--worker-pool-min",
                "4",
                "--worker-pool-max",
                "1",
            ])
            .unwrap();
        let serve_matches = matches.subcommand_matches("serve").unwrap();
        let config = Config::from_args(serve_matches).unwrap();

        assert_eq!(config.worker_pool_min, 4);
        assert_eq!(config.worker_pool_max, 4);
    }
}
