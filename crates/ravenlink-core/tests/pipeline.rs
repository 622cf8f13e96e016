use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ravenlink_core::{
    BatchCollector, Connection, DrainPolicy, MeasurementSink, MemorySink, MemorySource,
    NotifyOutcome, PublishTarget,
};

fn block(ts: u32, demand: u32, multiplier: u32, divisor: u32) -> String {
    format!(
        "<InstantaneousDemand>\r\n  <TimeStamp>0x{ts:08x}</TimeStamp>\r\n  <Demand>0x{demand:06x}</Demand>\r\n  \
         <Multiplier>0x{multiplier:08x}</Multiplier>\r\n  <Divisor>0x{divisor:08x}</Divisor>\r\n\
         </InstantaneousDemand>\r\n"
    )
}

#[test]
fn connection_streams_readings_in_order() {
    let sink = Arc::new(MemorySink::new());
    let target = PublishTarget::bound(sink.clone(), "house_power");
    let collector = BatchCollector::new(1, DrainPolicy::immediate(), target).expect("collector");
    let mut connection = Connection::new(MemorySource::new(), collector);

    for (ts, demand) in [(1, 1500), (2, 250), (3, 0)] {
        connection.source_mut().feed(block(ts, demand, 1, 1000).as_bytes());
        let outcome = connection.poll().expect("poll").expect("bytes pending");
        assert!(matches!(outcome, NotifyOutcome::Completed(_)));
    }
    connection.close().expect("close");

    let values: Vec<(i64, u64)> = sink
        .readings()
        .into_iter()
        .map(|reading| (reading.value, reading.timestamp))
        .collect();
    assert_eq!(
        values,
        vec![(1500, 946_684_801), (250, 946_684_802), (0, 946_684_803)]
    );
}

#[test]
fn message_split_over_notifications_is_reassembled() {
    let sink = Arc::new(MemorySink::new());
    let target = PublishTarget::bound(sink.clone(), "house_power");
    let mut collector =
        BatchCollector::new(3, DrainPolicy::immediate(), target).expect("collector");
    let text = block(60, 3000, 2, 1000);
    let (head, rest) = text.split_at(30);
    let (middle, tail) = rest.split_at(40);

    let mut source = MemorySource::new();
    for part in [head, middle, tail] {
        source.feed(part.as_bytes());
        collector.notify_data_available(&mut source);
    }

    let readings = sink.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].value, 6000);
    assert_eq!(readings[0].timestamp, 946_684_860);
    assert_eq!(readings[0].time.as_deref(), Some("2000-01-01T00:01:00Z"));
}

#[test]
fn bad_block_does_not_stop_the_stream() {
    let sink = Arc::new(MemorySink::new());
    let target = PublishTarget::bound(sink.clone(), "house_power");
    let mut collector =
        BatchCollector::new(1, DrainPolicy::immediate(), target).expect("collector");
    let mut source = MemorySource::new();

    source.feed(b"<InstantaneousDemand><TimeStamp>0xnothex</TimeStamp></InstantaneousDemand>");
    collector.notify_data_available(&mut source);
    source.feed(b"<InstantaneousDemand><TimeStamp>0x1</Demand>");
    collector.notify_data_available(&mut source);
    source.feed(block(9, 42, 1, 1).as_bytes());
    collector.notify_data_available(&mut source);

    let readings = sink.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].value, 42_000);
}

#[test]
fn concurrent_rebinding_never_splits_a_batch() {
    let first = Arc::new(MemorySink::new());
    let second = Arc::new(MemorySink::new());
    let target = PublishTarget::bound(first.clone(), "house_power");
    let mut collector =
        BatchCollector::new(1, DrainPolicy::immediate(), target.clone()).expect("collector");

    let stop = Arc::new(AtomicBool::new(false));
    let toggler = {
        let stop = Arc::clone(&stop);
        let target = target.clone();
        let sinks: [Arc<dyn MeasurementSink>; 2] = [first.clone(), second.clone()];
        thread::spawn(move || {
            let mut turn = 0usize;
            while !stop.load(Ordering::Relaxed) {
                if turn % 3 == 2 {
                    target.detach_sink();
                } else {
                    target.attach_sink(Arc::clone(&sinks[turn % 2]));
                }
                turn += 1;
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    let pair = format!("{}{}", block(1, 1, 1, 1), block(2, 2, 1, 1));
    let mut source = MemorySource::new();
    for _ in 0..200 {
        source.feed(pair.as_bytes());
        collector.notify_data_available(&mut source);
    }
    stop.store(true, Ordering::Relaxed);
    toggler.join().expect("toggler thread");

    // Each batch holds two consecutive readings; a torn batch breaks the pairing.
    for sink in [&first, &second] {
        let readings = sink.readings();
        assert_eq!(readings.len() % 2, 0);
        for batch in readings.chunks(2) {
            assert_eq!(batch[0].timestamp + 1, batch[1].timestamp);
        }
    }
}
