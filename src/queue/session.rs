//! Session keys and the sorted-set member encoding.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::error::QueueError;

/// Per-delivery correlation key, `identifier|token`.
///
/// Minted fresh for every pop, so two deliveries of the same element never
/// share a session. Acks and retry-count queries address a delivery through
/// its session; an ack for a predecessor delivery therefore cannot touch the
/// current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session(String);

impl Session {
    pub(crate) fn mint(element_id: &str) -> Self {
        Session(format!("{}|{}", element_id, Uuid::new_v4()))
    }

    /// Rebuild a session from its string form, validating the shape.
    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        match raw.split_once('|') {
            Some((id, token)) if !id.is_empty() && !token.is_empty() => {
                Ok(Session(raw.to_string()))
            }
            _ => Err(QueueError::Parse(format!("malformed session key {raw:?}"))),
        }
    }

    /// Identifier of the element this delivery carries.
    pub fn element_id(&self) -> &str {
        self.0.split_once('|').map(|(id, _)| id).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire form of one queued entry: `identifier|timeoutNanos|attempts`.
///
/// Entries written by older deployments omit the attempts field; the decoder
/// treats those as never delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Member {
    pub id: String,
    pub timeout: Duration,
    pub attempts: u32,
}

impl Member {
    pub fn new(id: &str, timeout: Duration, attempts: u32) -> Self {
        Self {
            id: id.to_string(),
            timeout,
            attempts,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}|{}", self.id, self.timeout.as_nanos(), self.attempts)
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        let fields: Vec<&str> = raw.split('|').collect();
        let (id, timeout, attempts) = match fields.as_slice() {
            [id, timeout] => (*id, *timeout, "0"),
            [id, timeout, attempts] => (*id, *timeout, *attempts),
            _ => {
                return Err(QueueError::Parse(format!("malformed queue member {raw:?}")));
            }
        };
        if id.is_empty() {
            return Err(QueueError::Parse(format!(
                "queue member {raw:?} has an empty identifier"
            )));
        }
        let timeout_ns: u64 = timeout
            .parse()
            .map_err(|_| QueueError::Parse(format!("bad timeout in queue member {raw:?}")))?;
        let attempts: u32 = attempts
            .parse()
            .map_err(|_| QueueError::Parse(format!("bad attempt count in queue member {raw:?}")))?;
        Ok(Self {
            id: id.to_string(),
            timeout: Duration::from_nanos(timeout_ns),
            attempts,
        })
    }
}
