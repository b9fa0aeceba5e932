//! Interrupt top half.

use crate::device::{LinkDevice, LinkMode};
use crate::error::LinkError;
use crate::extension::Dispatch;
use crate::mailbox::{self, Mailbox, flags_value};

impl LinkDevice {
    /// Entry point for the CP -> AP interrupt.
    ///
    /// Reads the CP mailbox, acknowledges the interrupt and dispatches the
    /// value. Never blocks beyond bounded confirmed-write retries; delivery
    /// to consumers happens on the delivery task.
    pub fn handle_interrupt(&self) {
        let _power = self.shared.power.acquire();
        let value = self.shared.mem.read16(self.shared.layout.cp2ap_off);
        self.shared.ext.clear_intr();
        self.dispatch(value);
    }

    /// Act on one CP mailbox value.
    pub fn dispatch(&self, value: u16) {
        trace!("cp2ap -> {value:#06x}");
        if self.shared.ext.dispatch(self, value) == Dispatch::Handled {
            return;
        }
        match mailbox::decode(value) {
            Mailbox::Invalid(v) => debug!("ignoring mailbox value {v:#06x} without valid bit"),
            Mailbox::Extended(v) => self.shared.ext.ext_command(self, v),
            Mailbox::Command(cmd) => self.handle_command(cmd),
            Mailbox::UnknownCommand(code) => warn!("unknown command code {code:#x}"),
            Mailbox::Flags(bits) => self.handle_flags(bits),
        }
    }

    fn handle_flags(&self, bits: u16) {
        let mode = self.mode();
        if mode != LinkMode::Ipc {
            debug!("channel flags {bits:#06x} ignored in {mode} mode");
            return;
        }

        let mut res_ack = 0;
        for ch in &self.shared.channels {
            let masks = ch.masks;
            if bits & masks.res_ack != 0 {
                trace!("{}: RES_ACK", ch.id);
                ch.res_ack.notify_one();
            }
            if bits & (masks.send | masks.req_ack) == 0 {
                continue;
            }
            let ack_requested = bits & masks.req_ack != 0;
            // Answered from the delivery task if the burst is still in
            // shared memory.
            if self.receive(ch, ack_requested) && ack_requested {
                res_ack |= masks.res_ack;
            }
        }

        if res_ack != 0
            && self.mode() == LinkMode::Ipc
            && let Err(e) = self.write_mailbox(flags_value(res_ack))
        {
            self.fault(&LinkError::Confirm(e));
        }
    }
}
