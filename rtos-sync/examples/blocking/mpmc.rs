use std::{thread, time::Duration};

use log::*;
use rtos_sync::{sync::BlockingRingBuffer, time::export::ExtU64, Error};
use static_cell::StaticCell;

const NUM_PRODUCERS: u32 = 4;
const NUM_CONSUMERS: usize = NUM_PRODUCERS as usize / 2;
const QUEUE_CAPACITY: usize = 3;
const MESSAGES_PER_PRODUCER: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct Measurement {
    sensor: u32,
    sequence: u32,
}

type MeasurementQueue = BlockingRingBuffer<Measurement, QUEUE_CAPACITY>;

fn measurement_queue() -> &'static MeasurementQueue {
    static QUEUE: StaticCell<MeasurementQueue> = StaticCell::new();
    QUEUE.init(MeasurementQueue::new())
}

fn producer(sensor: u32, queue: &'static MeasurementQueue) {
    for sequence in 0..MESSAGES_PER_PRODUCER {
        let measurement = Measurement { sensor, sequence };

        // Producers outnumber consumers, so the queue regularly fills up and
        // `add` blocks until a consumer has made room.
        queue.add(measurement).expect("queue destroyed");
        info!("sensor {} produced #{}", sensor, sequence);

        thread::sleep(Duration::from_millis(10 * sensor as u64));
    }
}

fn consumer(id: usize, queue: &'static MeasurementQueue) -> usize {
    let mut consumed = 0;
    loop {
        // Consumers give up once the producers went quiet for a while.
        match queue.get_timed(500.millis()) {
            Ok(measurement) => {
                info!(
                    "consumer {} received sensor {} #{}",
                    id, measurement.sensor, measurement.sequence
                );
                consumed += 1;

                // Slow delivery to demonstrate backpressure.
                thread::sleep(Duration::from_millis(50));
            }
            Err(Error::TimedOut) => return consumed,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_nanos()
        .init();

    let queue = measurement_queue();

    let producers: Vec<_> = (0..NUM_PRODUCERS)
        .map(|sensor| thread::spawn(move || producer(sensor, queue)))
        .collect();
    let consumers: Vec<_> = (0..NUM_CONSUMERS)
        .map(|id| thread::spawn(move || consumer(id, queue)))
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let consumed: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();

    assert_eq!(consumed, (NUM_PRODUCERS * MESSAGES_PER_PRODUCER) as usize);
    assert!(queue.is_empty());
    info!("all {} measurements delivered", consumed);
}
