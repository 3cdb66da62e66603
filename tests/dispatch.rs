use pg_gatherer::cli::{actions::Action, commands, dispatch::handler};
use secrecy::ExposeSecret;
use std::time::Duration;

const ENV_VARS: [&str; 7] = [
    "PG_GATHERER_DSN",
    "PG_GATHERER_PORT",
    "PG_GATHERER_LISTEN",
    "PG_GATHERER_RELOAD_INTERVAL",
    "PG_GATHERER_STATEMENT_TIMEOUT",
    "PG_GATHERER_CONNECT_TIMEOUT",
    "PG_GATHERER_MAX_CONNECTIONS",
];

#[test]
fn test_defaults() {
    temp_env::with_vars_unset(ENV_VARS, || {
        let matches = commands::new().get_matches_from(vec!["pg_gatherer"]);
        let Action::Run(options) = handler(&matches).unwrap();

        assert_eq!(options.port, 9433);
        assert_eq!(options.listen, None);
        assert_eq!(
            options.dsn.expose_secret(),
            "postgresql://postgres@localhost:5432/pgobserver"
        );
        assert_eq!(options.reload_interval, Duration::from_secs(60));
        assert_eq!(options.max_connections, 5);
        assert_eq!(options.source.statement_timeout, Duration::from_secs(15));
        assert_eq!(options.source.connect_timeout, Duration::from_secs(5));
    });
}

#[test]
fn test_flags() {
    temp_env::with_vars_unset(ENV_VARS, || {
        let matches = commands::new().get_matches_from(vec![
            "pg_gatherer",
            "--port",
            "9500",
            "--listen",
            "::1",
            "--reload-interval",
            "30",
            "--max-connections",
            "10",
            "--connect-timeout",
            "2",
        ]);
        let Action::Run(options) = handler(&matches).unwrap();

        assert_eq!(options.port, 9500);
        assert_eq!(options.listen.as_deref(), Some("::1"));
        assert_eq!(options.reload_interval, Duration::from_secs(30));
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.source.connect_timeout, Duration::from_secs(2));
    });
}

#[test]
fn test_env_vars() {
    temp_env::with_vars(
        [
            ("PG_GATHERER_DSN", Some("postgres://monitor@sink:6432/pgobserver")),
            ("PG_GATHERER_PORT", Some("9600")),
            ("PG_GATHERER_STATEMENT_TIMEOUT", Some("3")),
            ("PG_GATHERER_LISTEN", None),
        ],
        || {
            let matches = commands::new().get_matches_from(vec!["pg_gatherer"]);
            let Action::Run(options) = handler(&matches).unwrap();

            assert_eq!(
                options.dsn.expose_secret(),
                "postgres://monitor@sink:6432/pgobserver"
            );
            assert_eq!(options.port, 9600);
            assert_eq!(options.source.statement_timeout, Duration::from_secs(3));
        },
    );
}

#[test]
fn test_flag_beats_env_var() {
    temp_env::with_vars([("PG_GATHERER_PORT", Some("9600"))], || {
        let matches = commands::new().get_matches_from(vec!["pg_gatherer", "--port", "9700"]);
        let Action::Run(options) = handler(&matches).unwrap();

        assert_eq!(options.port, 9700);
    });
}

#[test]
fn test_zero_timeouts_are_rejected() {
    temp_env::with_vars_unset(ENV_VARS, || {
        for flag in ["--statement-timeout", "--connect-timeout", "--max-connections"] {
            let result = commands::new().try_get_matches_from(vec!["pg_gatherer", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 should be rejected");
        }
    });
}
