//! Transmit path: software queue to shared TX queue.

use bytes::Bytes;

use crate::channel::{Channel, ChannelId, TxState};
use crate::device::{LinkDevice, LinkMode, SendStatus};
use crate::error::LinkError;
use crate::mailbox::flags_value;

impl LinkDevice {
    pub(crate) fn enqueue(&self, ch: &Channel, data: Bytes) -> Result<SendStatus, LinkError> {
        let max = ch.layout.tx.max_message();
        if data.len() > max {
            return Err(LinkError::MessageTooLarge {
                channel: ch.id,
                len: data.len(),
                max,
            });
        }

        {
            let mut tx = ch.tx.lock();
            if ch.id == ChannelId::Raw && tx.queue.len() > self.shared.config.txq_max {
                ch.counters.dropped(1);
                warn!(
                    "{}: backlog of {} messages, dropping {} bytes",
                    ch.id,
                    tx.queue.len(),
                    data.len()
                );
                return Ok(SendStatus::Dropped);
            }
            tx.queue.push_back(data);
        }

        let mode = self.mode();
        if mode != LinkMode::Ipc {
            debug!("{}: queued while {mode}", ch.id);
            return Ok(SendStatus::Queued);
        }
        self.flush(ch)
    }

    /// Move as much of the software queue as fits into shared memory.
    ///
    /// Whatever is left waits for RES_ACK: the retry worker is armed and
    /// the consumer told to hold off.
    pub(crate) fn flush(&self, ch: &Channel) -> Result<SendStatus, LinkError> {
        let _power = self.shared.power.acquire();
        let mut tx = ch.tx.lock();
        if let Err(e) = self.transmit_locked(ch, &mut tx) {
            drop(tx);
            self.fault(&e);
            return Err(e);
        }
        if tx.queue.is_empty() {
            // A direct send can drain a backlog before RES_ACK arrives.
            tx.retransmit_pending = false;
            let resume = std::mem::take(&mut tx.suspended);
            drop(tx);
            if resume && let Some(consumer) = self.consumer(ch.id) {
                debug!("{}: backlog drained by direct send", ch.id);
                consumer.resume_tx();
            }
            return Ok(SendStatus::Sent);
        }

        tx.retransmit_pending = true;
        let suspend = !std::mem::replace(&mut tx.suspended, true);
        let spawn = !std::mem::replace(&mut tx.worker_armed, true);
        let waiting = tx.queue.len();
        drop(tx);

        debug!("{}: {waiting} messages waiting for space", ch.id);
        if suspend && let Some(consumer) = self.consumer(ch.id) {
            consumer.suspend_tx();
        }
        if spawn {
            self.spawn_retry_worker(ch.id);
        }
        Ok(SendStatus::Deferred)
    }

    /// Copy queued messages into the TX queue until one does not fit.
    ///
    /// Messages are never split. Signals SEND once if anything went out.
    /// Returns the number of bytes written.
    pub(crate) fn transmit_locked(
        &self,
        ch: &Channel,
        tx: &mut TxState,
    ) -> Result<usize, LinkError> {
        let mem = &*self.shared.mem;
        let policy = &self.shared.config.confirm;
        let queue = &ch.layout.tx;

        let mut bytes = 0;
        let mut messages = 0;
        let result = loop {
            let Some(msg) = tx.queue.front() else {
                break Ok(());
            };
            let space = match queue.space(mem) {
                Ok(space) => space,
                Err(source) => {
                    warn!("{}: {source}, resetting TX queue", ch.id);
                    break match queue.reset(mem, policy) {
                        Ok(()) => Err(LinkError::InvalidPointers {
                            channel: ch.id,
                            source,
                        }),
                        Err(e) => Err(e.into()),
                    };
                }
            };
            if msg.len() > space {
                trace!("{}: {} bytes queued, {space} free", ch.id, msg.len());
                tx.retransmit_pending = true;
                break Ok(());
            }
            if let Err(e) = queue.push(mem, msg, policy) {
                break Err(e.into());
            }
            bytes += msg.len();
            messages += 1;
            tx.queue.pop_front();
        };

        if messages > 0 {
            ch.counters.sent(messages, bytes);
        }
        if bytes > 0 {
            trace!("{}: wrote {bytes} bytes in {messages} messages", ch.id);
            self.write_mailbox(flags_value(ch.masks.send))?;
        }
        result.map(|()| bytes)
    }
}
