//! Inter-thread messages between the emulation thread and the UI-stub
//! thread, and the stub thread itself.
//!
//! Two `crossbeam_channel::bounded(1)` pairs carry these, one in each
//! direction — bounded to 1 so a message in flight provides the same
//! backpressure an OS pipe handle would, per the wire format's fixed-size
//! framing.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;

use crate::keyboard::KeyMatrix;

/// A 4-byte inter-thread message: `data[0]` names the kind, `data[1]` is
/// the full-render flag, `data[2]` is the framing-changed flag, `data[3]`
/// is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Emulator → UI: render requested.
    Vsync { full_render: bool, framing_changed: bool },
    /// UI → emulator: synchronous render completed.
    RenderDone,
    /// Either direction: the sender is shutting down.
    Exited,
}

impl Message {
    const KIND_VSYNC: u8 = 0;
    const KIND_RENDER_DONE: u8 = 1;
    const KIND_EXITED: u8 = 2;

    #[must_use]
    pub fn to_wire(self) -> [u8; 4] {
        match self {
            Message::Vsync { full_render, framing_changed } => {
                [Self::KIND_VSYNC, u8::from(full_render), u8::from(framing_changed), 0]
            }
            Message::RenderDone => [Self::KIND_RENDER_DONE, 0, 0, 0],
            Message::Exited => [Self::KIND_EXITED, 0, 0, 0],
        }
    }

    #[must_use]
    pub fn from_wire(data: [u8; 4]) -> Option<Self> {
        match data[0] {
            Self::KIND_VSYNC => Some(Message::Vsync {
                full_render: data[1] != 0,
                framing_changed: data[2] != 0,
            }),
            Self::KIND_RENDER_DONE => Some(Message::RenderDone),
            Self::KIND_EXITED => Some(Message::Exited),
            _ => None,
        }
    }
}

/// The emulation thread's handle onto the UI-stub thread: the two SPSC
/// channels, the shared keyboard matrix, and the shared exit flag/result
/// code the UI thread sets on window-closed.
pub struct UiHandle {
    pub to_ui: Sender<Message>,
    pub from_ui: Receiver<Message>,
    pub keys: Arc<KeyMatrix>,
    exited: Arc<AtomicBool>,
    exit_code: Arc<AtomicI32>,
    join: Option<JoinHandle<()>>,
}

impl UiHandle {
    /// Whether the UI thread has signaled window-closed. The emulation
    /// thread checks this at its next dispatcher exit, per §5's
    /// cancellation model — there is no forced termination of a running
    /// translated block.
    #[must_use]
    pub fn exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    /// Send VSYNC and, if synchronous rendering was requested, block until
    /// `RENDER_DONE` or the UI thread exits.
    pub fn vsync(&self, full_render: bool, framing_changed: bool, synchronous: bool) {
        if self.to_ui.send(Message::Vsync { full_render, framing_changed }).is_err() {
            return;
        }
        if !synchronous {
            return;
        }
        match self.from_ui.recv() {
            Ok(Message::RenderDone | Message::Exited) | Err(_) => {}
            Ok(_) => {}
        }
    }
}

impl Drop for UiHandle {
    fn drop(&mut self) {
        let _ = self.to_ui.send(Message::Exited);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the UI-stub thread: it acknowledges every VSYNC immediately (no
/// real window, renderer, or audio sink behind it) and exposes the
/// keyboard matrix it alone writes to.
#[must_use]
pub fn spawn_stub_ui() -> UiHandle {
    let (to_ui, ui_inbox) = crossbeam_channel::bounded::<Message>(1);
    let (ui_outbox, from_ui) = crossbeam_channel::bounded::<Message>(1);
    let keys = Arc::new(KeyMatrix::new());
    let exited = Arc::new(AtomicBool::new(false));
    let exit_code = Arc::new(AtomicI32::new(0));

    let thread_exited = Arc::clone(&exited);
    let thread_exit_code = Arc::clone(&exit_code);
    let join = std::thread::spawn(move || {
        loop {
            match ui_inbox.recv() {
                Ok(Message::Vsync { .. }) => {
                    let _ = ui_outbox.send(Message::RenderDone);
                }
                Ok(Message::Exited) | Err(_) => {
                    thread_exited.store(true, Ordering::Release);
                    thread_exit_code.store(0, Ordering::Release);
                    let _ = ui_outbox.send(Message::Exited);
                    break;
                }
                Ok(Message::RenderDone) => {}
            }
        }
    });

    UiHandle { to_ui, from_ui, keys, exited, exit_code, join: Some(join) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_wire_round_trips() {
        let msg = Message::Vsync { full_render: true, framing_changed: false };
        assert_eq!(Message::from_wire(msg.to_wire()), Some(msg));
    }

    #[test]
    fn stub_ui_acknowledges_synchronous_vsync() {
        let ui = spawn_stub_ui();
        ui.vsync(true, false, true);
        assert!(!ui.exited());
    }
}
