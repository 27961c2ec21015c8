//! Primary/secondary endpoints and the failover resolver.
//!
//! A storage account is reachable through a primary endpoint and, for
//! geo-redundant accounts, a read-only secondary. The location mode decides
//! which one each attempt targets; `next_location` is the only place that
//! decides how attempts alternate between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::StorageError;

/// One of the two endpoints of a storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    Primary,
    Secondary,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Primary => write!(f, "primary"),
            StorageLocation::Secondary => write!(f, "secondary"),
        }
    }
}

/// Endpoint-selection mode for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    #[default]
    PrimaryOnly,
    PrimaryThenSecondary,
    SecondaryOnly,
    SecondaryThenPrimary,
}

impl LocationMode {
    /// Location targeted by the first attempt.
    pub fn initial_location(self) -> StorageLocation {
        match self {
            LocationMode::PrimaryOnly | LocationMode::PrimaryThenSecondary => {
                StorageLocation::Primary
            }
            LocationMode::SecondaryOnly | LocationMode::SecondaryThenPrimary => {
                StorageLocation::Secondary
            }
        }
    }

    /// True if some attempt under this mode may target the secondary endpoint.
    pub fn uses_secondary(self) -> bool {
        self != LocationMode::PrimaryOnly
    }

    /// True if `location` may be targeted under this mode.
    pub fn allows(self, location: StorageLocation) -> bool {
        match self {
            LocationMode::PrimaryOnly => location == StorageLocation::Primary,
            LocationMode::SecondaryOnly => location == StorageLocation::Secondary,
            LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary => true,
        }
    }
}

impl std::str::FromStr for LocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "primary_only" | "primary" => Ok(LocationMode::PrimaryOnly),
            "primary_then_secondary" => Ok(LocationMode::PrimaryThenSecondary),
            "secondary_only" | "secondary" => Ok(LocationMode::SecondaryOnly),
            "secondary_then_primary" => Ok(LocationMode::SecondaryThenPrimary),
            other => Err(format!("unknown location mode: {}", other)),
        }
    }
}

/// Which endpoints a particular command is able to run against.
/// Writes are typically primary-only since the secondary is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandLocationMode {
    PrimaryOnly,
    SecondaryOnly,
    #[default]
    PrimaryOrSecondary,
}

/// Primary endpoint plus optional secondary endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    pub primary: Url,
    pub secondary: Option<Url>,
}

impl StorageUri {
    pub fn new(primary: Url, secondary: Option<Url>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary_only(primary: Url) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    /// Endpoint for `location`, if configured.
    pub fn get(&self, location: StorageLocation) -> Option<&Url> {
        match location {
            StorageLocation::Primary => Some(&self.primary),
            StorageLocation::Secondary => self.secondary.as_ref(),
        }
    }

    /// Joins a resource path onto both endpoints.
    pub fn join(&self, path: &str) -> Result<StorageUri, url::ParseError> {
        let secondary = match &self.secondary {
            Some(s) => Some(s.join(path)?),
            None => None,
        };
        Ok(StorageUri {
            primary: self.primary.join(path)?,
            secondary,
        })
    }
}

/// Next location to try after a failed attempt at `current`.
///
/// Alternating modes flip on every call regardless of which side they
/// started from; single-location modes always stay put.
pub fn next_location(current: StorageLocation, mode: LocationMode) -> StorageLocation {
    match mode {
        LocationMode::PrimaryOnly => StorageLocation::Primary,
        LocationMode::SecondaryOnly => StorageLocation::Secondary,
        LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary => match current {
            StorageLocation::Primary => StorageLocation::Secondary,
            StorageLocation::Secondary => StorageLocation::Primary,
        },
    }
}

/// Reconciles the requested mode with what the command and the account support.
/// Runs before the first attempt; failures are pre-flight errors.
pub fn resolve_location_mode(
    uri: &StorageUri,
    requested: LocationMode,
    command: CommandLocationMode,
) -> Result<LocationMode, StorageError> {
    let mode = match command {
        CommandLocationMode::PrimaryOnly => {
            if requested == LocationMode::SecondaryOnly {
                return Err(StorageError::pre_flight(
                    "this operation can only run against the primary location",
                ));
            }
            LocationMode::PrimaryOnly
        }
        CommandLocationMode::SecondaryOnly => {
            if requested == LocationMode::PrimaryOnly {
                return Err(StorageError::pre_flight(
                    "this operation can only run against the secondary location",
                ));
            }
            LocationMode::SecondaryOnly
        }
        CommandLocationMode::PrimaryOrSecondary => requested,
    };

    if mode.uses_secondary() && uri.secondary.is_none() {
        return Err(StorageError::pre_flight(format!(
            "location mode {:?} requires a secondary endpoint",
            mode
        )));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(secondary: bool) -> StorageUri {
        StorageUri::new(
            Url::parse("http://account.example/").unwrap(),
            secondary.then(|| Url::parse("http://account-secondary.example/").unwrap()),
        )
    }

    #[test]
    fn single_location_modes_never_move() {
        use StorageLocation::*;
        assert_eq!(next_location(Primary, LocationMode::PrimaryOnly), Primary);
        assert_eq!(next_location(Secondary, LocationMode::PrimaryOnly), Primary);
        assert_eq!(next_location(Primary, LocationMode::SecondaryOnly), Secondary);
        assert_eq!(next_location(Secondary, LocationMode::SecondaryOnly), Secondary);
    }

    #[test]
    fn alternating_modes_flip_each_retry() {
        let mode = LocationMode::PrimaryThenSecondary;
        let mut loc = mode.initial_location();
        let mut seen = vec![loc];
        for _ in 0..3 {
            loc = next_location(loc, mode);
            seen.push(loc);
        }
        use StorageLocation::*;
        assert_eq!(seen, vec![Primary, Secondary, Primary, Secondary]);

        let mode = LocationMode::SecondaryThenPrimary;
        let first = mode.initial_location();
        assert_eq!(first, Secondary);
        assert_eq!(next_location(first, mode), Primary);
    }

    #[test]
    fn primary_only_command_narrows_mode() {
        let mode = resolve_location_mode(
            &uri(true),
            LocationMode::PrimaryThenSecondary,
            CommandLocationMode::PrimaryOnly,
        )
        .unwrap();
        assert_eq!(mode, LocationMode::PrimaryOnly);

        let err = resolve_location_mode(
            &uri(true),
            LocationMode::SecondaryOnly,
            CommandLocationMode::PrimaryOnly,
        )
        .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn secondary_mode_requires_secondary_uri() {
        let err = resolve_location_mode(
            &uri(false),
            LocationMode::PrimaryThenSecondary,
            CommandLocationMode::PrimaryOrSecondary,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PreFlight);

        let ok = resolve_location_mode(
            &uri(false),
            LocationMode::PrimaryOnly,
            CommandLocationMode::PrimaryOrSecondary,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn location_mode_from_str() {
        assert_eq!(
            "primary-then-secondary".parse::<LocationMode>().unwrap(),
            LocationMode::PrimaryThenSecondary
        );
        assert_eq!("secondary".parse::<LocationMode>().unwrap(), LocationMode::SecondaryOnly);
        assert!("sideways".parse::<LocationMode>().is_err());
    }

    #[test]
    fn join_applies_to_both_endpoints() {
        let joined = uri(true).join("container/blob.txt").unwrap();
        assert_eq!(joined.primary.path(), "/container/blob.txt");
        assert_eq!(
            joined.get(StorageLocation::Secondary).unwrap().path(),
            "/container/blob.txt"
        );
    }
}
