//! The batch process generator (spec §4.5): a cooperating thread that
//! creates a new process every `batch_process_freq` simulated ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::facade::System;
use crate::scheduler::TICK_MS;

const POLL_INTERVAL: Duration = Duration::from_millis(TICK_MS);

pub struct BatchGenerator {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BatchGenerator {
    /// Spawns the generator thread. `freq_ticks == 0` disables it (the
    /// thread idles without ever creating a process).
    pub fn start(system: System, freq_ticks: u64) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = Arc::clone(&running);

        let thread = thread::spawn(move || {
            let mut last_tick = system.scheduler().simulated_time().get();
            while running_thread.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL);
                if !running_thread.load(Ordering::SeqCst) {
                    break;
                }
                if freq_ticks == 0 {
                    continue;
                }

                let now = system.scheduler().simulated_time().get();
                let elapsed = now.saturating_sub(last_tick);
                let intervals = elapsed / freq_ticks;
                if intervals == 0 {
                    continue;
                }
                last_tick += intervals * freq_ticks;

                // Catch up in one pass if the thread fell behind (spec
                // §4.5).
                for _ in 0..intervals {
                    system.create_batch_process();
                }
            }
        });

        Self {
            running,
            thread: Some(thread),
        }
    }

    /// Stops cleanly (spec §4.5). Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BatchGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
