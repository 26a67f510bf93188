//! Structured signals a worker emits when it settles.
//!
//! Workers report outcomes by writing a single tagged JSON object to their
//! signal file before exiting. A clean exit with no signal file is treated by
//! the scheduler as plain completion.

use serde::{Deserialize, Serialize};

use crate::role::Role;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    /// The step is done.
    Complete { summary: String },
    /// Progress was made but the step is not finished; `continuation_point`
    /// tells a resumed session where to pick up.
    PartiallyComplete {
        progress: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continuation_point: Option<String>,
    },
    /// A decision belongs to the user; the whole run stops and surfaces it.
    NeedsUserInput { question: String, context: String },
    /// A different role must take over this step.
    NeedsRoleFollowup {
        target_role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}
