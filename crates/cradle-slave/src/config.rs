//! Slave startup identity.

use thiserror::Error;
use uuid::Uuid;

/// Immutable identity bundle supplied to a slave at startup.
///
/// The engine's isolate passes these as alternating `key value` argument
/// pairs, which is exactly the shape [`from_args`](SlaveConfig::from_args)
/// parses.
#[derive(Debug, Clone)]
pub struct SlaveConfig {
    /// Identity of this slave within its engine.
    pub uuid: Uuid,

    /// App this slave serves.
    pub app: String,

    /// Runtime profile to load.
    pub profile: String,
}

/// Errors from startup argument parsing.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// A key was passed without its value.
    #[error("missing value for argument '{0}'")]
    MissingValue(String),

    /// An argument this slave does not understand.
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    /// A required argument was not passed at all.
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    /// The slave identity is not a valid UUID.
    #[error("invalid uuid '{value}': {reason}")]
    InvalidUuid { value: String, reason: String },
}

impl SlaveConfig {
    /// Parse the identity from `--uuid <uuid> --app <name> --profile <name>`
    /// argument pairs.
    pub fn from_args<I>(args: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut uuid = None;
        let mut app = None;
        let mut profile = None;

        let mut args = args.into_iter();
        while let Some(key) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| ArgsError::MissingValue(key.clone()))?;

            match key.as_str() {
                "--uuid" => {
                    uuid = Some(Uuid::parse_str(&value).map_err(|e| ArgsError::InvalidUuid {
                        value: value.clone(),
                        reason: e.to_string(),
                    })?)
                }
                "--app" => app = Some(value),
                "--profile" => profile = Some(value),
                _ => return Err(ArgsError::UnknownArgument(key)),
            }
        }

        Ok(Self {
            uuid: uuid.ok_or(ArgsError::MissingArgument("--uuid"))?,
            app: app.ok_or(ArgsError::MissingArgument("--app"))?,
            profile: profile.ok_or(ArgsError::MissingArgument("--profile"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_identity() {
        let uuid = Uuid::new_v4();
        let config = SlaveConfig::from_args(args(&[
            "--uuid",
            &uuid.to_string(),
            "--app",
            "example",
            "--profile",
            "default",
        ]))
        .unwrap();

        assert_eq!(config.uuid, uuid);
        assert_eq!(config.app, "example");
        assert_eq!(config.profile, "default");
    }

    #[test]
    fn test_missing_argument() {
        let uuid = Uuid::new_v4();
        let err = SlaveConfig::from_args(args(&["--uuid", &uuid.to_string(), "--app", "example"]))
            .unwrap_err();
        assert!(matches!(err, ArgsError::MissingArgument("--profile")));
    }

    #[test]
    fn test_missing_value() {
        let err = SlaveConfig::from_args(args(&["--app"])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingValue(_)));
    }

    #[test]
    fn test_unknown_argument() {
        let err = SlaveConfig::from_args(args(&["--verbose", "yes"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnknownArgument(_)));
    }

    #[test]
    fn test_invalid_uuid() {
        let err = SlaveConfig::from_args(args(&["--uuid", "not-a-uuid"])).unwrap_err();
        assert!(matches!(err, ArgsError::InvalidUuid { .. }));
    }
}
