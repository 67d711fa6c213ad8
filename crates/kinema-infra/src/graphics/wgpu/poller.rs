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
//! The thread that drives wgpu callbacks and hands completions to their owners.
//!
//! wgpu only runs `map_async` and `on_submitted_work_done` callbacks from inside
//! `Device::poll`. The poller keeps polling while submissions are outstanding, and
//! performs the readback and the user callback outside of wgpu's own callbacks.

use super::context::HeadlessContext;
use kinema_core::renderer::{CompletedSubmission, CompletionCallback, RenderError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// A mappable range that is read once its submission completes.
pub(crate) struct MappedReadback {
    pub buffer: Arc<wgpu::Buffer>,
    pub offset: u64,
    pub size: u64,
}

/// A submission whose completion has not been reported yet.
pub(crate) struct InFlight {
    pub submission: u64,
    /// Receives the outcome of the wgpu callback.
    pub status: flume::Receiver<Result<(), String>>,
    pub readback: Option<MappedReadback>,
    pub on_complete: CompletionCallback,
}

#[derive(Default)]
struct Outstanding {
    count: Mutex<u64>,
    idle: Condvar,
}

impl Outstanding {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

pub(crate) struct Poller {
    jobs: Option<flume::Sender<InFlight>>,
    outstanding: Arc<Outstanding>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Poller {
    /// Spawns the polling thread. It polls every `interval` while work is outstanding.
    pub fn spawn(context: Arc<HeadlessContext>, interval: Duration) -> std::io::Result<Self> {
        let (jobs, rx) = flume::unbounded::<InFlight>();
        let outstanding = Arc::new(Outstanding::default());
        let thread_outstanding = outstanding.clone();
        let thread = std::thread::Builder::new()
            .name("kinema-wgpu-poller".into())
            .spawn(move || run(context, rx, thread_outstanding, interval))?;
        Ok(Self {
            jobs: Some(jobs),
            outstanding,
            thread: Some(thread),
        })
    }

    /// Hands a submission to the poller. Its callback runs on the poller thread.
    pub fn track(&self, in_flight: InFlight) {
        self.outstanding.add();
        let Some(jobs) = &self.jobs else {
            complete(in_flight, Err("the poller has shut down".into()), &self.outstanding);
            return;
        };
        if let Err(flume::SendError(in_flight)) = jobs.send(in_flight) {
            complete(in_flight, Err("the poller has shut down".into()), &self.outstanding);
        }
    }

    /// Number of submissions whose callback has not run yet.
    pub fn in_flight(&self) -> u64 {
        *self.outstanding.count.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Blocks until every tracked submission has been completed.
    pub fn wait_idle(&self) {
        let mut count = self.outstanding.count.lock().unwrap_or_else(|p| p.into_inner());
        while *count > 0 {
            count = self
                .outstanding
                .idle
                .wait(count)
                .unwrap_or_else(|p| p.into_inner());
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != std::thread::current().id() && thread.join().is_err() {
                log::warn!("The wgpu poller thread panicked");
            }
        }
    }
}

fn run(
    context: Arc<HeadlessContext>,
    rx: flume::Receiver<InFlight>,
    outstanding: Arc<Outstanding>,
    interval: Duration,
) {
    log::debug!("wgpu poller started (interval {interval:?})");
    let mut pending: Vec<InFlight> = Vec::new();
    loop {
        let wait = if pending.is_empty() {
            Duration::from_millis(100)
        } else {
            interval
        };
        match rx.recv_timeout(wait) {
            Ok(job) => pending.push(job),
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => {
                if pending.is_empty() {
                    break;
                }
                std::thread::sleep(interval);
            }
        }
        pending.extend(rx.try_iter());
        if pending.is_empty() {
            continue;
        }

        if let Err(e) = context.device.poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {e:?}");
        }

        let mut waiting = Vec::with_capacity(pending.len());
        for job in pending.drain(..) {
            match job.status.try_recv() {
                Ok(status) => complete(job, status, &outstanding),
                Err(flume::TryRecvError::Empty) => waiting.push(job),
                Err(flume::TryRecvError::Disconnected) => complete(
                    job,
                    Err("wgpu dropped the completion callback".into()),
                    &outstanding,
                ),
            }
        }
        pending = waiting;
    }
    log::debug!("wgpu poller stopped");
}

fn complete(job: InFlight, status: Result<(), String>, outstanding: &Outstanding) {
    let InFlight {
        submission,
        readback,
        on_complete,
        ..
    } = job;

    let result = match (status, readback) {
        (Err(e), Some(_)) => Err(RenderError::ReadbackFailed(e)),
        (Err(e), None) => Err(RenderError::SubmissionFailed(e)),
        (Ok(()), Some(readback)) => {
            let end = readback.offset + readback.size;
            let bytes = readback
                .buffer
                .slice(readback.offset..end)
                .get_mapped_range()
                .to_vec();
            readback.buffer.unmap();
            Ok(CompletedSubmission {
                readback: Some(bytes),
            })
        }
        (Ok(()), None) => Ok(CompletedSubmission::default()),
    };
    if let Err(e) = &result {
        log::error!("wgpu submission {submission} failed: {e}");
    } else {
        log::trace!("wgpu submission {submission} completed");
    }
    on_complete(result);
    outstanding.done();
}
