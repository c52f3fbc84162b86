use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use resilience_core::{EventListeners, FnListener, ResilienceEvent};

#[derive(Debug)]
struct ProbeEvent {
    name: &'static str,
    at: Instant,
}

impl ResilienceEvent for ProbeEvent {
    fn event_type(&self) -> &'static str {
        "probe"
    }
    fn timestamp(&self) -> Instant {
        self.at
    }
    fn pattern_name(&self) -> &str {
        self.name
    }
}

#[test]
fn listeners_fan_out_to_every_registered_callback() {
    let total = Arc::new(AtomicUsize::new(0));
    let mut listeners = EventListeners::new();
    for _ in 0..4 {
        let total = Arc::clone(&total);
        listeners.add(FnListener::new(move |_: &ProbeEvent| {
            total.fetch_add(1, Ordering::SeqCst);
        }));
    }

    listeners.emit(&ProbeEvent {
        name: "instance-a",
        at: Instant::now(),
    });

    assert_eq!(total.load(Ordering::SeqCst), 4);
}
