//! Process environment (develop, test, release, prod).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LegoError;

/// Deployment environment of the running process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; access logs are mirrored to stdout.
    #[default]
    Develop,
    /// Shared test environment.
    Test,
    /// Pre-production release environment.
    Release,
    /// Production.
    Prod,
}

impl Environment {
    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Test => "test",
            Environment::Release => "release",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LegoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Environment::Develop),
            "test" => Ok(Environment::Test),
            "release" => Ok(Environment::Release),
            "prod" => Ok(Environment::Prod),
            _ => Err(LegoError::config(format!("Unknown environment: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("develop".parse::<Environment>().unwrap(), Environment::Develop);
        assert_eq!("TEST".parse::<Environment>().unwrap(), Environment::Test);
        assert_eq!("Release".parse::<Environment>().unwrap(), Environment::Release);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_display_round_trips_name() {
        for env in [
            Environment::Develop,
            Environment::Test,
            Environment::Release,
            Environment::Prod,
        ] {
            assert_eq!(env.to_string().parse::<Environment>().unwrap(), env);
        }
    }

    #[test]
    fn test_environment_default() {
        assert_eq!(Environment::default(), Environment::Develop);
    }
}
