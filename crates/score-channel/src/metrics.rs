use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    connected: AtomicU64,
    closed: AtomicU64,
    messages: AtomicU64,
    decode_fallbacks: AtomicU64,
    transport_errors: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connected() {
    increment(&COUNTERS.connected);
}

pub fn record_closed() {
    increment(&COUNTERS.closed);
}

pub fn record_message() {
    increment(&COUNTERS.messages);
}

pub fn record_decode_fallback() {
    increment(&COUNTERS.decode_fallbacks);
}

pub fn record_transport_error() {
    increment(&COUNTERS.transport_errors);
}

#[derive(Clone, Debug, Default)]
pub struct ChannelMetricsSnapshot {
    pub connected: u64,
    pub closed: u64,
    pub messages: u64,
    pub decode_fallbacks: u64,
    pub transport_errors: u64,
}

pub fn snapshot() -> ChannelMetricsSnapshot {
    ChannelMetricsSnapshot {
        connected: COUNTERS.connected.load(Ordering::Relaxed),
        closed: COUNTERS.closed.load(Ordering::Relaxed),
        messages: COUNTERS.messages.load(Ordering::Relaxed),
        decode_fallbacks: COUNTERS.decode_fallbacks.load(Ordering::Relaxed),
        transport_errors: COUNTERS.transport_errors.load(Ordering::Relaxed),
    }
}
