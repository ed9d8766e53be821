//! Goal command forwarding
//!
//! Every inbound goal becomes exactly one pointing command, issued as soon as
//! it arrives. There is no queueing, coalescing or rate limiting here; any
//! backpressure belongs to the session. No acknowledgement is produced.

use crate::conversions::pointing_args;
use crate::error::GimbalResult;
use crate::gimbal::GimbalSession;
use crate::messages::GoalCommand;
use std::sync::Arc;
use tracing::debug;

/// Turns goals into pointing commands on the session
pub struct CommandForwarder {
    session: Arc<dyn GimbalSession>,
    forwarded: u64,
    failed: u64,
}

impl CommandForwarder {
    /// Forwarder issuing commands on `session`
    pub fn new(session: Arc<dyn GimbalSession>) -> Self {
        Self {
            session,
            forwarded: 0,
            failed: 0,
        }
    }

    /// Issue one pointing command for `goal`
    pub async fn forward(&mut self, goal: GoalCommand) -> GimbalResult<()> {
        let (pitch, roll, yaw) = pointing_args(&goal);
        debug!(
            "Forwarding goal ({}, {}, {}) as pitch={} roll={} yaw={}",
            goal.x, goal.y, goal.z, pitch, roll, yaw
        );

        match self.session.set_pointing(pitch, roll, yaw).await {
            Ok(()) => {
                self.forwarded += 1;
                Ok(())
            }
            Err(e) => {
                self.failed += 1;
                Err(e)
            }
        }
    }

    /// Goals accepted by the session
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Goals dropped after a session error
    pub fn failed(&self) -> u64 {
        self.failed
    }
}
