// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! The ordering gate: a thread that receives completed frames in any order and hands
//! them to the sink in sequence order.

use super::health::PipelineHealth;
use super::{DeliveredFrame, FrameError, FrameReceipt, SinkAdapter};
use kinema_core::sink::FrameImage;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A frame whose GPU work finished, successfully or not.
pub(crate) struct CompletedFrame {
    pub sequence: u64,
    pub outcome: Result<FrameImage, FrameError>,
    pub receipt: FrameReceipt,
}

pub(crate) enum GateMessage {
    Completed(CompletedFrame),
    /// Finish the sink and report back. Every produced frame must have been posted.
    Finish(flume::Sender<Result<(), FrameError>>),
}

/// Owner of the gate thread.
pub(crate) struct OrderingGate {
    messages: flume::Sender<GateMessage>,
    thread: Option<JoinHandle<()>>,
}

impl OrderingGate {
    pub(crate) fn spawn(adapter: SinkAdapter, health: Arc<PipelineHealth>) -> io::Result<Self> {
        let (messages, inbox) = flume::unbounded();
        let thread = std::thread::Builder::new()
            .name("kinema-ordering-gate".into())
            .spawn(move || GateLoop::new(adapter, health).run(inbox))?;
        Ok(Self {
            messages,
            thread: Some(thread),
        })
    }

    /// A sender for completion callbacks.
    pub(crate) fn sender(&self) -> flume::Sender<GateMessage> {
        self.messages.clone()
    }

    /// Finishes the sink after every queued frame and joins the thread.
    pub(crate) fn finish(mut self) -> Result<(), FrameError> {
        let (reply, response) = flume::bounded(1);
        self.messages
            .send(GateMessage::Finish(reply))
            .map_err(|_| FrameError::Poisoned("the ordering gate exited early".into()))?;
        let result = response
            .recv()
            .unwrap_or_else(|_| Err(FrameError::Poisoned("the ordering gate panicked".into())));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("The ordering gate thread panicked");
            }
        }
        result
    }
}

impl Drop for OrderingGate {
    fn drop(&mut self) {
        // Without `finish`, callbacks still in flight keep the gate's inbox open; the
        // thread exits on its own once the last of them is gone.
        if self.thread.take().is_some() {
            log::debug!("Ordering gate detached without finishing the sink");
        }
    }
}

struct GateLoop {
    adapter: SinkAdapter,
    health: Arc<PipelineHealth>,
    pending: BTreeMap<u64, CompletedFrame>,
    next_sequence: u64,
}

impl GateLoop {
    fn new(adapter: SinkAdapter, health: Arc<PipelineHealth>) -> Self {
        Self {
            adapter,
            health,
            pending: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    fn run(mut self, inbox: flume::Receiver<GateMessage>) {
        while let Ok(message) = inbox.recv() {
            match message {
                GateMessage::Completed(frame) => self.accept(frame),
                GateMessage::Finish(reply) => {
                    self.abandon_pending("its predecessor was never completed");
                    let result = self.adapter.finish().map_err(FrameError::Sink);
                    if reply.send(result).is_err() {
                        log::warn!("Nobody waited for the sink to finish");
                    }
                    return;
                }
            }
        }
        self.abandon_pending("the pipeline was dropped");
    }

    fn accept(&mut self, frame: CompletedFrame) {
        if frame.sequence < self.next_sequence || self.pending.contains_key(&frame.sequence) {
            log::warn!("Ignoring duplicate completion of frame {}", frame.sequence);
            return;
        }
        if frame.sequence != self.next_sequence {
            log::trace!(
                "Frame {} completed early, waiting for frame {}",
                frame.sequence,
                self.next_sequence
            );
        }
        self.pending.insert(frame.sequence, frame);
        while let Some(frame) = self.pending.remove(&self.next_sequence) {
            self.deliver(frame);
            self.next_sequence += 1;
        }
    }

    fn deliver(&mut self, frame: CompletedFrame) {
        let CompletedFrame {
            sequence,
            outcome,
            receipt,
        } = frame;
        let result = outcome.and_then(|image| {
            self.adapter
                .deliver(image)
                .map(|time| DeliveredFrame { sequence, time })
                .map_err(|e| {
                    // A closed readiness signal means an earlier failure; report that one.
                    let err = self.health.fatal().unwrap_or(FrameError::Sink(e));
                    self.health.fail(err)
                })
        });
        match &result {
            Ok(delivered) => {
                log::debug!("Frame {sequence} delivered at {}", delivered.time);
                self.health.record_delivered();
            }
            Err(e) => {
                log::debug!("Frame {sequence} not delivered: {e}");
                self.health.record_failed();
            }
        }
        receipt.settle(result);
    }

    fn abandon_pending(&mut self, reason: &str) {
        for (sequence, frame) in std::mem::take(&mut self.pending) {
            log::warn!("Frame {sequence} abandoned: {reason}");
            self.health.record_failed();
            frame
                .receipt
                .settle(Err(FrameError::Poisoned(format!("frame {sequence} abandoned: {reason}"))));
        }
    }
}
