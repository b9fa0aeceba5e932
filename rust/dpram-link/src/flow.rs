//! REQ_ACK / RES_ACK flow control.
//!
//! When a message does not fit, the channel's retry worker asks the CP to
//! report when it has consumed data (REQ_ACK) and waits for the answer
//! (RES_ACK). Each RES_ACK triggers another transmit attempt; the worker
//! exits once the software queue is empty, the link leaves IPC mode or the
//! device shuts down.

use crate::channel::{Channel, ChannelId};
use crate::device::{LinkDevice, LinkMode};
use crate::mailbox::flags_value;

impl LinkDevice {
    pub(crate) fn spawn_retry_worker(&self, id: ChannelId) {
        debug!("{id}: arming retry worker");
        let link = self.clone();
        self.shared
            .runtime
            .spawn(async move { link.retry_worker(id).await });
    }

    async fn retry_worker(self, id: ChannelId) {
        let Some(ch) = self.channel(id) else { return };
        let timeout = self.shared.config.res_ack_timeout;

        loop {
            if self.mode() != LinkMode::Ipc {
                debug!("{id}: retry worker exiting, link is {}", self.mode());
                disarm(ch);
                return;
            }

            {
                let mut tx = ch.tx.lock();
                if tx.queue.is_empty() {
                    trace!("{id}: backlog already sent, retry worker exiting");
                    tx.worker_armed = false;
                    return;
                }
            }

            if let Err(e) = self.write_mailbox(flags_value(ch.masks.req_ack)) {
                disarm(ch);
                self.fault(&e.into());
                return;
            }

            tokio::select! {
                _ = self.shared.interrupt.fired() => {
                    trace!("{id}: retry worker interrupted");
                    return;
                }
                res = tokio::time::timeout(timeout, ch.res_ack.notified()) => {
                    if res.is_err() {
                        debug!("{id}: no RES_ACK within {timeout:?}, asking again");
                        continue;
                    }
                    if self.process_res_ack(ch) {
                        return;
                    }
                }
            }
        }
    }

    /// Retry the transmit after the CP freed space.
    ///
    /// Returns true once the worker has nothing left to do.
    pub(crate) fn process_res_ack(&self, ch: &Channel) -> bool {
        if self.mode() != LinkMode::Ipc {
            disarm(ch);
            return true;
        }

        let _power = self.shared.power.acquire();
        let mut tx = ch.tx.lock();
        if let Err(e) = self.transmit_locked(ch, &mut tx) {
            tx.worker_armed = false;
            drop(tx);
            self.fault(&e);
            return true;
        }
        if !tx.queue.is_empty() {
            tx.retransmit_pending = true;
            return false;
        }

        tx.retransmit_pending = false;
        tx.worker_armed = false;
        let resume = std::mem::take(&mut tx.suspended);
        drop(tx);

        debug!("{}: backlog drained", ch.id);
        if resume && let Some(consumer) = self.consumer(ch.id) {
            consumer.resume_tx();
        }
        true
    }
}

fn disarm(ch: &Channel) {
    ch.tx.lock().worker_armed = false;
}
