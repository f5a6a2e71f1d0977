use std::fmt;
use std::str::FromStr;

use crate::error::DispatchError;

pub const PATH_BATCH: &str = "/batch";
pub const PATH_CAPTURE: &str = "/capture";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Alias,
    Event,
    Identity,
    Track,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Alias => "alias",
            Resource::Event => "event",
            Resource::Identity => "identity",
            Resource::Track => "track",
        }
    }

    /// Operation selected when the host leaves `operation` unset.
    pub fn default_operation(self) -> Operation {
        match self {
            Resource::Track => Operation::Page,
            _ => Operation::Create,
        }
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alias" => Ok(Resource::Alias),
            "event" => Ok(Resource::Event),
            "identity" => Ok(Resource::Identity),
            "track" => Ok(Resource::Track),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Page,
    Screen,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Page => "page",
            Operation::Screen => "screen",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "page" => Ok(Operation::Page),
            "screen" => Ok(Operation::Screen),
            other => Err(other.to_string()),
        }
    }
}

/// Every supported (resource, operation) pair. Anything else is rejected by
/// [`Target::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    AliasCreate,
    EventCreate,
    IdentityCreate,
    TrackPage,
    TrackScreen,
}

impl Target {
    pub fn resolve(resource: &str, operation: &str) -> Result<Self, DispatchError> {
        let unsupported = || DispatchError::UnsupportedOperation {
            resource: resource.to_string(),
            operation: operation.to_string(),
        };
        let parsed_resource = resource.parse::<Resource>().map_err(|_| unsupported())?;
        let parsed_operation = operation.parse::<Operation>().map_err(|_| unsupported())?;
        match (parsed_resource, parsed_operation) {
            (Resource::Alias, Operation::Create) => Ok(Target::AliasCreate),
            (Resource::Event, Operation::Create) => Ok(Target::EventCreate),
            (Resource::Identity, Operation::Create) => Ok(Target::IdentityCreate),
            (Resource::Track, Operation::Page) => Ok(Target::TrackPage),
            (Resource::Track, Operation::Screen) => Ok(Target::TrackScreen),
            _ => Err(unsupported()),
        }
    }

    pub fn resource(self) -> Resource {
        match self {
            Target::AliasCreate => Resource::Alias,
            Target::EventCreate => Resource::Event,
            Target::IdentityCreate => Resource::Identity,
            Target::TrackPage | Target::TrackScreen => Resource::Track,
        }
    }

    pub fn operation(self) -> Operation {
        match self {
            Target::AliasCreate | Target::EventCreate | Target::IdentityCreate => {
                Operation::Create
            }
            Target::TrackPage => Operation::Page,
            Target::TrackScreen => Operation::Screen,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Target::EventCreate => PATH_CAPTURE,
            _ => PATH_BATCH,
        }
    }

    pub fn is_batched(self) -> bool {
        matches!(self, Target::EventCreate)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource().as_str(), self.operation().as_str())
    }
}
