//! Receive path: shared RX queue to consumer.
//!
//! The interrupt path only copies bytes out of shared memory into a pooled
//! buffer; the delivery task hands them to consumers.

use crate::channel::Channel;
use crate::device::{LinkDevice, LinkMode};
use crate::dump::DumpKind;
use crate::error::LinkError;
use crate::framing;
use crate::mailbox::flags_value;

impl LinkDevice {
    /// Copy everything pending in `ch`'s RX queue into a free buffer.
    ///
    /// Returns true once the queue is empty. When no buffer is free the
    /// burst stays in shared memory, `ack_requested` is remembered and
    /// false is returned.
    pub(crate) fn receive(&self, ch: &Channel, ack_requested: bool) -> bool {
        let mem = &*self.shared.mem;
        let policy = &self.shared.config.confirm;
        let queue = &ch.layout.rx;
        let _power = self.shared.power.acquire();

        let mut rx = ch.rx.lock();
        let usage = match queue.usage(mem) {
            Ok(0) => return true,
            Ok(usage) => usage,
            Err(source) => {
                warn!("{}: {source}, resetting RX queue", ch.id);
                let (err, emptied) = match queue.reset(mem, policy) {
                    Ok(()) => (
                        LinkError::InvalidPointers {
                            channel: ch.id,
                            source,
                        },
                        true,
                    ),
                    Err(e) => (e.into(), false),
                };
                drop(rx);
                self.fault(&err);
                return emptied;
            }
        };

        let Some(mut buf) = rx.free.pop() else {
            debug!("{}: no free RX buffer, {usage} bytes left for later", ch.id);
            rx.deferred = true;
            rx.ack_owed |= ack_requested;
            return false;
        };
        buf.clear();
        buf.resize(usage, 0);
        if let Err(e) = queue.pull(mem, &mut buf, policy) {
            rx.free.push(buf);
            drop(rx);
            self.fault(&e.into());
            return false;
        }
        trace!("{}: received {usage} bytes", ch.id);
        ch.counters.received(usage);

        if self.shared.config.dump.rx_bursts {
            self.enqueue_dump(DumpKind::RxBurst(ch.id), buf.clone());
        }
        rx.filled.push_back(buf);
        drop(rx);
        self.shared.rx_ready.notify_one();
        true
    }

    pub(crate) async fn run_delivery(self) {
        loop {
            tokio::select! {
                _ = self.shared.interrupt.fired() => {
                    trace!("delivery task stopping");
                    return;
                }
                _ = self.shared.rx_ready.notified() => self.deliver_pending(),
            }
        }
    }

    /// Drain every channel's filled buffers, oldest first.
    pub(crate) fn deliver_pending(&self) {
        for ch in &self.shared.channels {
            loop {
                let Some(buf) = ch.rx.lock().filled.pop_front() else {
                    break;
                };
                self.deliver_burst(ch, &buf);

                let (deferred, ack_owed) = {
                    let mut rx = ch.rx.lock();
                    rx.free.push(buf);
                    (
                        std::mem::take(&mut rx.deferred),
                        std::mem::take(&mut rx.ack_owed),
                    )
                };
                if deferred && self.mode() == LinkMode::Ipc && self.receive(ch, ack_owed) {
                    self.answer_req_ack(ch, ack_owed);
                }
            }
        }
    }

    /// RES_ACK for a REQ_ACK whose burst had to wait for a buffer.
    fn answer_req_ack(&self, ch: &Channel, owed: bool) {
        if !owed || self.mode() != LinkMode::Ipc {
            return;
        }
        trace!("{}: late RES_ACK", ch.id);
        if let Err(e) = self.write_mailbox(flags_value(ch.masks.res_ack)) {
            self.fault(&LinkError::Confirm(e));
        }
    }

    fn deliver_burst(&self, ch: &Channel, burst: &[u8]) {
        let consumer = self.consumer(ch.id);
        if consumer.is_none() {
            debug!("{}: no consumer, dropping {} bytes", ch.id, burst.len());
        }

        if !ch.framed {
            ch.counters.delivered();
            if let Some(consumer) = &consumer {
                consumer.deliver(burst);
            }
            return;
        }

        for frame in framing::frames(burst) {
            match frame {
                Ok(frame) => {
                    ch.counters.delivered();
                    if let Some(consumer) = &consumer {
                        consumer.deliver(frame.as_bytes());
                    }
                }
                Err(source) => {
                    self.fault(&LinkError::Frame {
                        channel: ch.id,
                        source,
                    });
                    return;
                }
            }
        }
    }
}
