use std::{thread, time::Duration};

use log::*;
use rtos_sync::ringbuffer::LockedRingBuffer;
use static_cell::StaticCell;

const HISTORY: usize = 5;

// Keeps the most recent samples only. A slow reader never blocks the sampler,
// old samples are overwritten instead.
type SampleHistory = LockedRingBuffer<u16, HISTORY>;

fn sample_history() -> &'static SampleHistory {
    static SAMPLES: StaticCell<SampleHistory> = StaticCell::new();
    SAMPLES.init(SampleHistory::new())
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_nanos()
        .init();

    let history = sample_history();

    let sampler = thread::spawn(move || {
        for sample in 0..20u16 {
            if let Some(evicted) = history.add_one(sample * 10) {
                debug!("sample {} dropped from history", evicted);
            }
            thread::sleep(Duration::from_millis(5));
        }
    });

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(30));
        info!("recent samples: {:?}", history.peek_many(HISTORY).as_slice());
    }

    sampler.join().unwrap();

    let latest = history.get_many(HISTORY);
    info!("final history: {:?}", latest.as_slice());
    assert_eq!(latest.as_slice(), &[150, 160, 170, 180, 190]);
}
