use foundation::{LayerId, Time};
use runtime::timer::TimerQueue;
use streaming::OutboundCommand;

use crate::config::ChannelConfig;

/// Lifecycle of one outbound command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandState {
    /// Held until the service is ready; `attempt` dispatch attempts have failed.
    Waiting { attempt: u32 },
    Sent,
    /// Gave up; the effect never reached the service.
    Abandoned,
}

/// A command waiting for the service to become ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub layer_id: LayerId,
    pub command: OutboundCommand,
    /// Attempts made so far.
    pub attempt: u32,
    /// Position in the channel's send order; retries never change it.
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Deferred {
    Waiting { attempt: u32, due: Time },
    Abandoned(PendingCommand),
}

/// Retry timers for commands sent before the service is ready.
///
/// Commands always come back out in send order, however many times each one
/// has been re-deferred.
#[derive(Debug)]
pub struct PendingQueue {
    timers: TimerQueue<PendingCommand>,
    retry_limit: u32,
    retry_delay_s: f64,
}

impl PendingQueue {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            timers: TimerQueue::new(),
            retry_limit: config.retry_limit,
            retry_delay_s: config.retry_delay_s,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_due(&self) -> Option<Time> {
        self.timers.next_due()
    }

    /// Parks `command` after a failed attempt, or gives it up once the limit is
    /// reached.
    pub fn defer(&mut self, command: PendingCommand, now: Time) -> Deferred {
        if command.attempt >= self.retry_limit {
            return Deferred::Abandoned(command);
        }
        let due = now.after(self.retry_delay_s);
        let attempt = command.attempt;
        self.timers.schedule(due, command);
        Deferred::Waiting { attempt, due }
    }

    /// Commands whose retry delay has elapsed, in send order.
    pub fn take_due(&mut self, now: Time) -> Vec<PendingCommand> {
        in_send_order(self.timers.drain_due(now).into_iter().map(|(_, cmd)| cmd))
    }

    /// Everything still waiting, in send order.
    pub fn take_all(&mut self) -> Vec<PendingCommand> {
        in_send_order(self.timers.drain_all().into_iter().map(|(_, cmd)| cmd))
    }
}

fn in_send_order(commands: impl Iterator<Item = PendingCommand>) -> Vec<PendingCommand> {
    let mut commands: Vec<_> = commands.collect();
    commands.sort_by_key(|cmd| cmd.seq);
    commands
}

#[cfg(test)]
mod tests {
    use super::{Deferred, PendingCommand, PendingQueue};
    use crate::config::ChannelConfig;
    use foundation::{LayerId, Time};
    use streaming::OutboundCommand;

    fn cmd(attempt: u32, zoom: u8) -> PendingCommand {
        PendingCommand {
            layer_id: LayerId(1),
            command: OutboundCommand::SetZoom(zoom),
            attempt,
            seq: u64::from(zoom),
        }
    }

    #[test]
    fn defers_until_limit() {
        let mut q = PendingQueue::new(&ChannelConfig {
            retry_limit: 3,
            retry_delay_s: 0.5,
            ..ChannelConfig::default()
        });
        assert_eq!(
            q.defer(cmd(2, 4), Time(1.0)),
            Deferred::Waiting {
                attempt: 2,
                due: Time(1.5)
            }
        );
        assert!(matches!(q.defer(cmd(3, 4), Time(1.0)), Deferred::Abandoned(_)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn due_commands_keep_send_order() {
        let mut q = PendingQueue::new(&ChannelConfig::default());
        q.defer(cmd(1, 1), Time::ZERO);
        q.defer(cmd(1, 2), Time::ZERO);
        q.defer(cmd(1, 3), Time(0.1));

        assert!(q.take_due(Time(0.2)).is_empty());
        let zooms: Vec<_> = q
            .take_due(Time(0.3))
            .into_iter()
            .map(|c| c.command)
            .collect();
        assert_eq!(
            zooms,
            vec![OutboundCommand::SetZoom(1), OutboundCommand::SetZoom(2)]
        );
        assert_eq!(q.take_all().len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn redeferred_command_stays_ahead_of_later_sends() {
        let mut q = PendingQueue::new(&ChannelConfig::default());
        q.defer(cmd(1, 1), Time::ZERO);
        q.defer(cmd(1, 2), Time(0.1));

        // The first command fails again and lands behind the second in time.
        let mut first = q.take_due(Time(0.35));
        assert_eq!(first.len(), 1);
        let mut retry = first.remove(0);
        retry.attempt += 1;
        q.defer(retry, Time(0.35));
        assert_eq!(q.next_due(), Some(Time(0.4)));

        let zooms: Vec<_> = q.take_all().into_iter().map(|c| c.command).collect();
        assert_eq!(
            zooms,
            vec![OutboundCommand::SetZoom(1), OutboundCommand::SetZoom(2)]
        );
    }
}
