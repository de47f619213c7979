//! Single-slot mailbox for the next outbound command.
//!
//! At most one command waits for the heartbeat loop. A newer command replaces
//! an unsent one, and a command past its expiry is dropped instead of sent.

use lamp_wire::Command;
use std::sync::Mutex;
use tokio::time::Instant;

/// A queued command and its expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    /// Plaintext command
    pub command: Command,
    /// Instant after which the command is no longer sent
    pub expires_at: Instant,
}

impl PendingCommand {
    /// Whether the command may still be sent at `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Result of draining the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// Nothing queued
    Empty,
    /// A command that should be written now
    Fresh(PendingCommand),
    /// A command that expired before it could be written
    Expired(PendingCommand),
}

/// The pending command slot
#[derive(Debug, Default)]
pub struct CommandMailbox {
    slot: Mutex<Option<PendingCommand>>,
}

impl CommandMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command, returning the unsent command it replaced
    pub fn put(&self, command: Command, expires_at: Instant) -> Option<PendingCommand> {
        self.lock().replace(PendingCommand {
            command,
            expires_at,
        })
    }

    /// Empty the slot, classifying what was in it
    pub fn take(&self, now: Instant) -> Take {
        match self.lock().take() {
            None => Take::Empty,
            Some(pending) if pending.is_fresh(now) => Take::Fresh(pending),
            Some(pending) => Take::Expired(pending),
        }
    }

    /// Put back a command whose write failed, unless a newer one arrived meanwhile
    pub fn restore(&self, pending: PendingCommand) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(pending);
        true
    }

    /// Whether a command is waiting
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Drop any queued command
    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingCommand>> {
        // The slot holds plain data, so a poisoned lock is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_last_write_wins() {
        let mailbox = CommandMailbox::new();
        let now = Instant::now();
        let ttl = now + Duration::from_secs(15);

        assert!(mailbox.put(Command::channel(1, 1).unwrap(), ttl).is_none());
        let replaced = mailbox.put(Command::channel(2, 2).unwrap(), ttl).unwrap();
        assert_eq!(replaced.command, Command::channel(1, 1).unwrap());

        match mailbox.take(now) {
            Take::Fresh(pending) => assert_eq!(pending.command, Command::channel(2, 2).unwrap()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(mailbox.take(now), Take::Empty);
    }

    #[test]
    fn test_expired_command_is_cleared() {
        let mailbox = CommandMailbox::new();
        let now = Instant::now();
        mailbox.put(Command::off(), now + Duration::from_secs(15));

        let later = now + Duration::from_secs(16);
        assert!(matches!(mailbox.take(later), Take::Expired(_)));
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Instant::now();
        let pending = PendingCommand {
            command: Command::off(),
            expires_at: now + Duration::from_secs(15),
        };
        assert!(pending.is_fresh(now + Duration::from_millis(14_999)));
        assert!(!pending.is_fresh(now + Duration::from_secs(15)));
    }

    #[test]
    fn test_restore_yields_to_newer_command() {
        let mailbox = CommandMailbox::new();
        let now = Instant::now();
        let ttl = now + Duration::from_secs(15);
        mailbox.put(Command::off(), ttl);
        let Take::Fresh(failed) = mailbox.take(now) else {
            panic!("expected fresh command");
        };

        assert!(mailbox.restore(failed));
        mailbox.clear();

        mailbox.put(Command::channel(4, 9).unwrap(), ttl);
        assert!(!mailbox.restore(failed));
        match mailbox.take(now) {
            Take::Fresh(pending) => assert_eq!(pending.command, Command::channel(4, 9).unwrap()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
