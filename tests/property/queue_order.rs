//! Property-based tests for the event queue.
//!
//! Uses proptest to verify:
//! 1. Items from a single producer leave the queue in enqueue order, however
//!    the drains are interleaved with the pushes.
//! 2. Under concurrent producers and a concurrent drainer every item is
//!    dequeued exactly once and each producer's items keep their order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatpump::queue::{EventQueue, Producer};
use chatpump_proto::message::{ConversationEvent, ConversationId, MemberId, MessageId};
use proptest::prelude::*;

// --- Helpers ---

fn event(producer: usize, seq: usize) -> ConversationEvent {
    ConversationEvent::received(
        MessageId::new(format!("{producer}:{seq}")),
        ConversationId::new("c"),
        MemberId::new(format!("p{producer}")),
        format!("item {seq}"),
    )
}

fn parse_id(id: &MessageId) -> (usize, usize) {
    let (producer, seq) = id.as_str().split_once(':').expect("id has a colon");
    (
        producer.parse().expect("numeric producer"),
        seq.parse().expect("numeric sequence"),
    )
}

// --- Property tests ---

proptest! {
    /// Interleaved pushes and drains still yield enqueue order overall.
    #[test]
    fn single_producer_fifo(drain_after in prop::collection::vec(any::<bool>(), 1..200)) {
        let queue = Arc::new(EventQueue::new());
        let producer = Producer::new(Arc::clone(&queue));
        let mut seen = Vec::new();

        for (seq, drain) in drain_after.iter().enumerate() {
            producer.enqueue(event(0, seq)).expect("queue is open");
            if *drain {
                seen.extend(queue.drain().into_iter().map(|item| parse_id(&item.event().message_id).1));
            }
        }
        seen.extend(queue.drain().into_iter().map(|item| parse_id(&item.event().message_id).1));

        let expected: Vec<usize> = (0..drain_after.len()).collect();
        prop_assert_eq!(seen, expected);
        prop_assert!(queue.is_empty());
    }

    /// Concurrent producers lose nothing and duplicate nothing.
    #[test]
    fn concurrent_producers_exactly_once(
        per_producer in prop::collection::vec(1usize..150, 1..6),
    ) {
        let queue = Arc::new(EventQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let drainer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut collected = Vec::new();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    collected.extend(queue.drain().into_iter().map(|item| item.into_event().message_id));
                    if finished {
                        break;
                    }
                    std::thread::yield_now();
                }
                collected
            })
        };

        let producers: Vec<_> = per_producer
            .iter()
            .enumerate()
            .map(|(p, &count)| {
                let producer = Producer::new(Arc::clone(&queue));
                std::thread::spawn(move || {
                    for seq in 0..count {
                        producer.enqueue(event(p, seq)).expect("queue is open");
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().expect("producer thread");
        }
        done.store(true, Ordering::Release);
        let collected = drainer.join().expect("drainer thread");

        prop_assert_eq!(collected.len(), per_producer.iter().sum::<usize>());

        let mut next = vec![0usize; per_producer.len()];
        for id in &collected {
            let (p, seq) = parse_id(id);
            prop_assert_eq!(seq, next[p], "producer {} out of order", p);
            next[p] += 1;
        }
        prop_assert_eq!(next, per_producer);
    }
}
