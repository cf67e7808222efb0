//! Identifier value objects.
//!
//! Every persisted entity is keyed by its own newtype so a [`PlanId`] can
//! never be handed to a lookup expecting a [`TaskId`]. Generated identifiers
//! are UUID v4 strings; [`StepId`]s usually come from the planner's model
//! output (e.g. `"step-1"`) and are only generated as a fallback.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh, globally unique identifier.
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::new_v4()))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a submitted task.
    TaskId,
    "task"
);
string_id!(
    /// Unique identifier for one plan version.
    PlanId,
    "plan"
);
string_id!(
    /// Identifier of a step, unique within its plan.
    StepId,
    "step"
);
string_id!(
    /// Identifier of a single cycle's action.
    ActionId,
    "action"
);
string_id!(
    /// Identifier of an action result.
    ResultId,
    "result"
);
string_id!(
    /// Identifier of a reflection.
    ReflectionId,
    "reflection"
);
string_id!(
    /// Identifier of a generated artifact.
    ArtifactId,
    "artifact"
);
