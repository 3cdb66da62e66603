use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pg_gatherer")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(built_info::GIT_COMMIT_HASH.unwrap_or("unknown"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("dsn")
                .long("dsn")
                .help("Connection string of the monitoring database (hosts registry and sink)")
                .default_value("postgresql://postgres@localhost:5432/pgobserver")
                .env("PG_GATHERER_DSN")
                .value_name("DSN"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port for the status endpoints (/health, /metrics, /gatherers)")
                .default_value("9433")
                .env("PG_GATHERER_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("IP address to bind to, IPv6 with IPv4 fallback when omitted")
                .env("PG_GATHERER_LISTEN")
                .value_name("IP"),
        )
        .arg(
            Arg::new("reload-interval")
                .long("reload-interval")
                .help("Seconds between reloads of the hosts registry")
                .default_value("60")
                .env("PG_GATHERER_RELOAD_INTERVAL")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("statement-timeout")
                .long("statement-timeout")
                .help("statement_timeout in seconds for queries on monitored hosts")
                .default_value("15")
                .env("PG_GATHERER_STATEMENT_TIMEOUT")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("connect-timeout")
                .long("connect-timeout")
                .help("Seconds to wait for a connection to a monitored host")
                .default_value("5")
                .env("PG_GATHERER_CONNECT_TIMEOUT")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("max-connections")
                .long("max-connections")
                .help("Size of the connection pool to the monitoring database")
                .default_value("5")
                .env("PG_GATHERER_MAX_CONNECTIONS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        )
}
