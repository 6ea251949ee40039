//! Validated name types for agents, flows, tools and sessions.
//!
//! Every name is a distinct newtype so an `AgentName` cannot be passed where a
//! `FlowName` is expected. All of them share the rules in [`NameValidator`]
//! and deserialize through `parse`, so a configuration document with an
//! invalid name fails to load instead of failing mid-run.
//!
//! ```rust
//! use concerto_core::identifiers::{AgentName, FlowName, SessionId};
//!
//! let agent = AgentName::parse("Greeter").unwrap();
//! let flow: FlowName = "onboarding".parse().unwrap();
//! let session = SessionId::generate();
//!
//! assert_eq!(agent.as_str(), "Greeter");
//! assert!(AgentName::parse("not valid").is_err());
//! # let _ = (flow, session);
//! ```

mod validation;

pub use validation::{MAX_NAME_LENGTH, NameError, NameValidator};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate a name.
            pub fn parse(name: impl AsRef<str>) -> Result<Self, NameError> {
                NameValidator::validate(name.as_ref()).map(|s| Self(s.to_string()))
            }

            /// Get the name as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Create a name without validation (for tests and constants only)
            #[doc(hidden)]
            pub fn new_unchecked(name: impl Into<String>) -> Self {
                Self(name.into())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                NameValidator::validate(&s)?;
                Ok(Self(s))
            }
        }

        impl TryFrom<&str> for $name {
            type Error = NameError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(
    /// Unique name of a registered agent.
    AgentName
);

define_name!(
    /// Unique name of a registered flow.
    FlowName
);

define_name!(
    /// Name under which a tool is invocable (local, remote, or agent-as-tool).
    ToolName
);

define_name!(
    /// Identifier of one logical conversation; keys the session memory log.
    SessionId
);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }
}

impl From<AgentName> for ToolName {
    fn from(agent: AgentName) -> Self {
        ToolName(agent.0)
    }
}

impl From<&AgentName> for ToolName {
    fn from(agent: &AgentName) -> Self {
        ToolName(agent.0.clone())
    }
}
