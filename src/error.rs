use std::time::Duration;

use thiserror::Error;

/// Broad classes a rejection falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Rejected immediately, never retried.
    Validation,
    /// A rule said no. Shown to the player, not logged as a failure.
    Policy,
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("you cannot send a request to yourself")]
    SelfTarget,
    #[error("you must wait {}s before sending another request", remaining.as_secs())]
    CooldownActive { remaining: Duration },
    #[error("that player is not online")]
    TargetOffline,
    #[error("you have no pending teleport request")]
    NoPendingRequest,
    #[error("you are not online")]
    NotOnline,
    #[error("that destination is not available")]
    DestinationUnavailable,
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::SelfTarget => ErrorKind::Validation,
            _ => ErrorKind::Policy,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum KitError {
    #[error("that kit does not exist")]
    UnknownKit,
    #[error("kit cooldown: {}s remaining", remaining.as_secs())]
    CooldownActive { remaining: Duration },
    #[error("kit names may only contain letters, digits, '_' and '-'")]
    InvalidName,
    #[error("that kit comes from config.yml and cannot be changed in game")]
    Configured,
    #[error("could not save kits.yml: {0}")]
    Save(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum WarpError {
    #[error("warp names may only contain letters, digits, '_' and '-'")]
    InvalidName,
    #[error("no warp with that name")]
    UnknownWarp,
    #[error("no spawn point has been set")]
    NoSpawn,
    #[error("could not save warps.yml: {0}")]
    Save(String),
    #[error(transparent)]
    Teleport(#[from] RequestError),
}

impl WarpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WarpError::InvalidName => ErrorKind::Validation,
            WarpError::Teleport(err) => err.kind(),
            _ => ErrorKind::Policy,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum HomeError {
    #[error("home names may only contain letters, digits, '_' and '-'")]
    InvalidName,
    #[error("you already have the maximum of {limit} homes")]
    LimitReached { limit: usize },
    #[error("you must wait {}s before setting another home", remaining.as_secs())]
    CooldownActive { remaining: Duration },
    #[error("no home with that name")]
    UnknownHome,
    #[error("your player data is still loading")]
    NotLoaded,
}

impl HomeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HomeError::InvalidName => ErrorKind::Validation,
            _ => ErrorKind::Policy,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("data file is not valid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config.yml is invalid: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
