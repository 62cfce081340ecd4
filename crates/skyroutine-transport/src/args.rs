//! Driver argument encoding.
//!
//! Drivers take a single argument string of `key=value` pairs joined by `-`:
//!
//! ```text
//! dc=dir-dp=mission42-dp=AUAVsim
//! ```
//!
//! `dc` names the driver command and `dp` carries positional parameters,
//! repeatable. Neither keys nor values may contain the delimiters, so the
//! builder rejects them instead of producing an ambiguous string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use skyroutine_utils::error::{ParamsError, TransportError};
use skyroutine_utils::types::check_driver_token;

/// Key naming the driver command
pub const KEY_COMMAND: &str = "dc";
/// Key for a positional driver parameter
pub const KEY_PARAM: &str = "dp";

const PAIR_DELIMITER: char = '-';
const KV_DELIMITER: char = '=';

/// Commands understood by the AUAV drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverCommand {
    /// Flight: take off
    Lft,
    /// Gimbal: calibrate
    Cal,
    /// Camera / trace store: set working directory
    Dir,
    /// Camera: capture an image
    Get,
    /// Camera: dump captured data
    Dmp,
    /// Trace store: query batch N
    Qrb,
    /// Flight: land
    Lnd,
}

impl DriverCommand {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lft => "lft",
            Self::Cal => "cal",
            Self::Dir => "dir",
            Self::Get => "get",
            Self::Dmp => "dmp",
            Self::Qrb => "qrb",
            Self::Lnd => "lnd",
        }
    }
}

impl fmt::Display for DriverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverCommand {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lft" => Ok(Self::Lft),
            "cal" => Ok(Self::Cal),
            "dir" => Ok(Self::Dir),
            "get" => Ok(Self::Get),
            "dmp" => Ok(Self::Dmp),
            "qrb" => Ok(Self::Qrb),
            "lnd" => Ok(Self::Lnd),
            other => Err(TransportError::InvalidArgument {
                reason: format!("unknown driver command '{other}'"),
            }),
        }
    }
}

/// Reject tokens that would break the encoding or the request URL.
fn check_token(kind: &str, token: &str) -> Result<(), TransportError> {
    check_driver_token(token).map_err(|problem| TransportError::InvalidArgument {
        reason: if token.is_empty() {
            format!("{kind} {problem}")
        } else {
            format!("{kind} '{token}' {problem}")
        },
    })
}

/// An ordered list of `key=value` pairs sent to a driver.
///
/// ```rust
/// use skyroutine_transport::{DriverArgs, DriverCommand};
///
/// let args = DriverArgs::command(DriverCommand::Dir)
///     .param("mission42")
///     .param("AUAVsim")
///     .build()
///     .unwrap();
/// assert_eq!(args.encode(), "dc=dir-dp=mission42-dp=AUAVsim");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverArgs {
    pairs: Vec<(String, String)>,
}

/// Builder returned by [`DriverArgs::command`]. Validation happens in `build`.
#[derive(Debug, Clone)]
pub struct DriverArgsBuilder {
    pairs: Vec<(String, String)>,
}

impl DriverArgs {
    /// Start an argument list with `dc=<command>`.
    #[must_use]
    pub fn command(command: DriverCommand) -> DriverArgsBuilder {
        DriverArgsBuilder {
            pairs: vec![(KEY_COMMAND.to_string(), command.as_str().to_string())],
        }
    }

    /// Parse an encoded argument string.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidArgument` for empty input or a field
    /// without `=`.
    pub fn parse(encoded: &str) -> Result<Self, TransportError> {
        if encoded.is_empty() {
            return Err(TransportError::InvalidArgument {
                reason: "argument string is empty".to_string(),
            });
        }
        let pairs = encoded
            .split(PAIR_DELIMITER)
            .map(|field| {
                field
                    .split_once(KV_DELIMITER)
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .ok_or_else(|| TransportError::InvalidArgument {
                        reason: format!("field '{field}' is not key=value"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pairs })
    }

    /// Encode as the wire string.
    #[must_use]
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}{KV_DELIMITER}{v}"))
            .collect::<Vec<_>>()
            .join(&PAIR_DELIMITER.to_string())
    }

    /// The driver command, if `dc` is present and recognized.
    #[must_use]
    pub fn driver_command(&self) -> Option<DriverCommand> {
        self.get(KEY_COMMAND).and_then(|v| v.parse().ok())
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All `dp` values in order.
    #[must_use]
    pub fn params(&self) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == KEY_PARAM)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

impl fmt::Display for DriverArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl DriverArgsBuilder {
    /// Append a positional `dp=` parameter.
    #[must_use]
    pub fn param(mut self, value: impl Into<String>) -> Self {
        self.pairs.push((KEY_PARAM.to_string(), value.into()));
        self
    }

    /// Append an arbitrary `key=value` pair.
    #[must_use]
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Validate every key and value.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidArgument` when a key or value is empty
    /// or contains a delimiter, URL metacharacter, or whitespace.
    pub fn build(self) -> Result<DriverArgs, TransportError> {
        for (k, v) in &self.pairs {
            check_token("key", k)?;
            check_token(&format!("value for '{k}'"), v)?;
        }
        Ok(DriverArgs { pairs: self.pairs })
    }
}

/// Parameters handed to a routine when it is started.
///
/// The parameter string is `-` delimited; the first field is `key=value` and
/// its value names the working directory used to scope driver commands.
///
/// ```rust
/// use skyroutine_transport::RoutineParams;
///
/// let params = RoutineParams::parse("dp=mission42-dp=extra").unwrap();
/// assert_eq!(params.working_dir(), "mission42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineParams {
    working_dir: String,
    raw: String,
}

impl RoutineParams {
    /// Parse the startup parameter string.
    ///
    /// # Errors
    ///
    /// Returns `ParamsError` if the string is empty, the first field lacks
    /// `=`, or its value is empty.
    pub fn parse(raw: &str) -> Result<Self, ParamsError> {
        let first = raw
            .split(PAIR_DELIMITER)
            .next()
            .filter(|f| !f.is_empty())
            .ok_or(ParamsError::Empty)?;

        let (_, value) =
            first
                .split_once(KV_DELIMITER)
                .ok_or_else(|| ParamsError::MalformedField {
                    field: first.to_string(),
                })?;

        if value.is_empty() {
            return Err(ParamsError::EmptyValue {
                field: first.to_string(),
            });
        }

        Ok(Self {
            working_dir: value.to_string(),
            raw: raw.to_string(),
        })
    }

    #[must_use]
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}
