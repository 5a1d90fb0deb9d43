use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Text commands accepted from the network channel, the HTTP API and the console
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `screenshot`
    Screenshot,
    /// `click X Y` in surface pixels
    Click { x: i32, y: i32 },
    /// `clickuv U V` with U, V in [0, 1]
    ClickUv { u: f64, v: f64 },
    /// `click NAME`
    ClickNamed(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments {
        command: &'static str,
        reason: String,
    },

    #[error("UV coordinates must be between 0 and 1 (got {u}, {v})")]
    UvOutOfRange { u: f64, v: f64 },

    #[error("configuration for {0} not found")]
    UnknownTarget(String),

    #[error("surface error: {0:#}")]
    Surface(#[source] anyhow::Error),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            [] => Err(CommandError::Empty),
            ["screenshot"] => Ok(Command::Screenshot),
            ["click", x, y] => Ok(Command::Click {
                x: parse_arg("click", x)?,
                y: parse_arg("click", y)?,
            }),
            ["click", name] => Ok(Command::ClickNamed((*name).to_string())),
            ["clickuv", u, v] => Ok(Command::ClickUv {
                u: parse_arg("clickuv", u)?,
                v: parse_arg("clickuv", v)?,
            }),
            ["screenshot", ..] | ["click", ..] | ["clickuv", ..] => {
                Err(CommandError::InvalidArguments {
                    command: command_name(parts[0]),
                    reason: format!("unexpected argument count {}", parts.len() - 1),
                })
            }
            [other, ..] => Err(CommandError::Unknown((*other).to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Screenshot => write!(f, "screenshot"),
            Command::Click { x, y } => write!(f, "click {} {}", x, y),
            Command::ClickUv { u, v } => write!(f, "clickuv {} {}", u, v),
            Command::ClickNamed(name) => write!(f, "click {}", name),
        }
    }
}

fn parse_arg<T: FromStr>(command: &'static str, raw: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| CommandError::InvalidArguments {
        command,
        reason: format!("cannot parse {:?}", raw),
    })
}

fn command_name(raw: &str) -> &'static str {
    match raw {
        "screenshot" => "screenshot",
        "clickuv" => "clickuv",
        _ => "click",
    }
}
