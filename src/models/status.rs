use std::fmt::{Display, Formatter, Result};

use serde::Serialize;

/// The single settlement a worker applies to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Disposition {
    Ack,
    /// Redeliver carrying this retry count.
    Requeue { retry_count: u32 },
    DeadLetter,
}

impl Display for Disposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Disposition::Ack => write!(f, "ack"),
            Disposition::Requeue { retry_count } => write!(f, "requeue({})", retry_count),
            Disposition::DeadLetter => write!(f, "dead_letter"),
        }
    }
}
