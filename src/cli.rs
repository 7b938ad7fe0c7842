use clap::builder::PossibleValue;
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, Command};

fn serve_args() -> Vec<Arg> {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("OKRA_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("OKRA_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("service-addr")
            .long("service-addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("OKRA_SERVICE_BIND_ADDRESS")
            .help("Bind the client-facing (Connect + GraphQL) HTTP server against ADDRESS"),
        Arg::new("service-port")
            .long("service-port")
            .value_name("PORT")
            .default_value("8080")
            .env("OKRA_SERVICE_PORT")
            .help("Listen for client requests on PORT"),
        Arg::new("admin-addr")
            .long("admin-addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("OKRA_ADMIN_BIND_ADDRESS")
            .help("Bind the admin HTTP server against ADDRESS"),
        Arg::new("admin-port")
            .long("admin-port")
            .value_name("PORT")
            .default_value("8081")
            .env("OKRA_ADMIN_PORT")
            .help("Listen for admin requests on PORT"),
        Arg::new("packages-dir")
            .long("packages-dir")
            .value_name("PACKAGES_DIR")
            .default_value("okra-packages")
            .env("OKRA_PACKAGES_DIR")
            .help("Scratch directory used to download and extract service packages"),
        Arg::new("worker-pool-min")
            .long("worker-pool-min")
            .value_name("MIN_WORKERS")
            .default_value("1")
            .env("OKRA_WORKER_POOL_MIN")
            .help("Minimum number of warmed WASM workers kept per deployed service"),
        Arg::new("worker-pool-max")
            .long("worker-pool-max")
            .value_name("MAX_WORKERS")
            .env("OKRA_WORKER_POOL_MAX")
            .help(
                "Maximum number of WASM workers a deployed service may grow to \
                 (defaults to the number of CPUs)",
            ),
        Arg::new("gateway-timeout-secs")
            .long("gateway-timeout-secs")
            .value_name("SECONDS")
            .default_value("30")
            .env("OKRA_GATEWAY_TIMEOUT_SECS")
            .help("Default request timeout applied by the Connect and GraphQL gateways"),
        Arg::new("connect-max-body-bytes")
            .long("connect-max-body-bytes")
            .value_name("BYTES")
            .default_value("10485760")
            .env("OKRA_CONNECT_MAX_BODY_BYTES")
            .help("Maximum accepted Connect request body size, in bytes"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));
    args
}

pub fn build_cli() -> Command {
    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Run the OKRA runtime core: two HTTP servers, the actor registry, and the package loader")
                .args(serve_args()),
        )
}
