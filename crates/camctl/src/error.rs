//! Monitor error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use camctl_config::ConfigError;

#[derive(Debug, Error, Diagnostic)]
pub enum MonitorError {
    #[error("Configuration is not usable")]
    #[diagnostic(
        code(camctl::config),
        help(
            "Config is read from {path}, or from the path given as the first argument.\n\
             Any field can be overridden from the environment, e.g. CAMCTL_DEVICE__HOST=192.168.1.50"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Could not set up the control-plane client")]
    #[diagnostic(code(camctl::client))]
    Client(#[from] camctl_api::Error),

    #[error("Could not open the event stream of {host}")]
    #[diagnostic(
        code(camctl::stream_unavailable),
        help(
            "Check that the camera is powered on and reachable, and that its\n\
             HTTP ({http_port}) and stream ({stream_port}) ports are correct."
        )
    )]
    StreamUnavailable {
        host: String,
        http_port: u16,
        stream_port: u16,
    },
}
