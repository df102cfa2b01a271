use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Kernel marker used in place of an argument value when its register could
/// not be dereferenced.
pub const FAULT_SENTINEL: &str = "(fault)";

/// A single notification read from the trace pipe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Process id, if the trace line reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Syscall name (without its symbol offset) or sub event name.
    pub name: String,
    /// True if this is the probed syscall, false for sub events.
    pub is_syscall: bool,
    /// Arguments of the event. Syscall arguments are keyed by position
    /// (arg0, arg1, ...), sub events use the keys found in the trace line.
    pub args: BTreeMap<String, String>,
}

impl Event {
    /// Returns the argument values of this event.
    ///
    /// Syscall arguments are returned in positional order, stopping at the
    /// first missing position. Sub event values are returned in key order.
    pub fn argv(&self) -> Vec<String> {
        if self.is_syscall {
            (0..)
                .map_while(|i| self.args.get(&format!("arg{i}")).cloned())
                .collect()
        } else {
            self.args.values().cloned().collect()
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pid) = self.pid {
            write!(f, "pid:{pid} ")?;
        }
        write!(f, "{}", self.name)?;

        if self.is_syscall {
            write!(f, "({})", self.argv().join(", "))
        } else {
            write!(f, " -> {{")?;
            for (i, (key, val)) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={val}")?;
            }
            write!(f, "}}")
        }
    }
}
