use std::{thread, time::Duration};

use log::*;
use rtos_sync::{sync::BlockingRingBuffer, Error};
use static_cell::StaticCell;

const NUM_WORKERS: usize = 3;

type JobQueue = BlockingRingBuffer<u32, 4>;

fn job_queue() -> &'static JobQueue {
    static QUEUE: StaticCell<JobQueue> = StaticCell::new();
    QUEUE.init(JobQueue::new())
}

fn worker(id: usize, queue: &'static JobQueue) {
    loop {
        match queue.get() {
            Ok(job) => info!("worker {} processing job {}", id, job),
            // Destroying the queue is the shutdown signal.
            Err(Error::Cancelled) => {
                info!("worker {} shutting down", id);
                return;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_nanos()
        .init();

    let queue = job_queue();

    let workers: Vec<_> = (0..NUM_WORKERS)
        .map(|id| thread::spawn(move || worker(id, queue)))
        .collect();

    for job in 0..8 {
        queue.add(job).expect("queue destroyed");
    }

    // Let the workers drain the queue and block on `get` again.
    thread::sleep(Duration::from_millis(100));
    queue.destroy();

    for worker in workers {
        worker.join().unwrap();
    }

    // Once destroyed, the queue refuses new work and hands the job back.
    let err = queue.add(8).unwrap_err();
    assert_eq!(err.kind(), Error::Cancelled);
    info!("job {:?} rejected after shutdown", err.into_item());
}
