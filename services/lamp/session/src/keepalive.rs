//! Heartbeat tick and command flushing.
//!
//! The lamp drops idle links, so an active session reads the diagnostic
//! characteristic on every tick. Commands ride on the same loop: whatever is
//! in the mailbox at tick time is written, then the loop waits for the next
//! tick or an early wake-up.

use crate::handshake::read_diagnostic;
use crate::mailbox::{CommandMailbox, Take};
use crate::transport::{with_timeout, BleTransport, TransportError, WriteMode};
use bytes::Bytes;
use lamp_wire::{to_hex, Characteristic, Command};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::time::Instant;
use tracing::{debug, trace};

/// What a flush did with the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Mailbox was empty
    Idle,
    /// Command was written and acknowledged
    Sent(Command),
    /// Command expired and was dropped unsent
    Expired(Command),
}

/// One heartbeat read. The value only proves the link is alive.
pub async fn heartbeat<T: BleTransport>(
    transport: &T,
    handle: &T::Handle,
    limit: Duration,
) -> Result<Bytes, TransportError> {
    read_diagnostic(transport, handle, limit).await
}

/// Write the pending command, if any and still fresh.
///
/// The slot is cleared either way. A command whose write fails goes back
/// into the slot unless a newer one replaced it meanwhile.
pub async fn flush_pending<T: BleTransport>(
    transport: &T,
    handle: &T::Handle,
    mailbox: &CommandMailbox,
    limit: Duration,
) -> Result<FlushOutcome, TransportError> {
    let pending = match mailbox.take(Instant::now()) {
        Take::Empty => return Ok(FlushOutcome::Idle),
        Take::Expired(pending) => {
            debug!("Dropping stale command {:?}", pending.command);
            return Ok(FlushOutcome::Expired(pending.command));
        }
        Take::Fresh(pending) => pending,
    };

    let frame = pending.command.encode();
    trace!("Writing command frame: {}", to_hex(&frame));
    let result = with_timeout(
        limit,
        transport.write_characteristic(
            handle,
            Characteristic::Command,
            &frame,
            WriteMode::WithResponse,
        ),
    )
    .await;

    match result {
        Ok(()) => Ok(FlushOutcome::Sent(pending.command)),
        Err(e) => {
            if mailbox.restore(pending) {
                debug!("Command write failed, kept for the next session");
            }
            Err(e)
        }
    }
}

/// Wait for the next tick, returning early when `wake` fires.
///
/// `wake` must come from [`Notify::notified`] and is woken by
/// [`Notify::notify_waiters`], which stores no permit: a wake-up sent while
/// nobody waits is not carried into a later wait. Returns `true` when woken
/// early.
pub async fn wait_for_tick(wake: Notified<'_>, interval: Duration) -> bool {
    tokio::time::timeout(interval, wake).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use lamp_wire::decrypt;
    use tokio::sync::Notify;

    const LIMIT: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_encoded_command() {
        let transport = MockTransport::new();
        let handle = transport.connect_with_retry("AA").await.unwrap();
        let mailbox = CommandMailbox::new();
        let command = Command::channel(2, 77).unwrap();
        mailbox.put(command, Instant::now() + Duration::from_secs(15));

        let outcome = flush_pending(&transport, &handle, &mailbox, LIMIT).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Sent(command));
        assert!(mailbox.is_empty());

        let writes = transport.writes_to(Characteristic::Command);
        assert_eq!(writes.len(), 1);
        let payload = decrypt(&writes[0]).unwrap();
        assert_eq!(&payload[..16], command.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_drops_expired_command() {
        let transport = MockTransport::new();
        let handle = transport.connect_with_retry("AA").await.unwrap();
        let mailbox = CommandMailbox::new();
        mailbox.put(Command::off(), Instant::now() + Duration::from_secs(15));

        tokio::time::advance(Duration::from_secs(16)).await;

        let outcome = flush_pending(&transport, &handle, &mailbox, LIMIT).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Expired(Command::off()));
        assert!(transport.writes_to(Characteristic::Command).is_empty());
        assert!(mailbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_command() {
        let transport = MockTransport::new();
        let handle = transport.connect_with_retry("AA").await.unwrap();
        let mailbox = CommandMailbox::new();
        mailbox.put(Command::off(), Instant::now() + Duration::from_secs(15));
        transport.fail_next_command_writes(1);

        let result = flush_pending(&transport, &handle, &mailbox, LIMIT).await;
        assert!(result.is_err());
        assert!(!mailbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tick_wakes_early() {
        let wake = Notify::new();
        let start = Instant::now();

        let pending = wake.notified();
        wake.notify_waiters();
        assert!(wait_for_tick(pending, Duration::from_secs(10)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        // No permit is kept for a later wait
        wake.notify_waiters();
        assert!(!wait_for_tick(wake.notified(), Duration::from_secs(10)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
