#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
  let c = IntCounter::new(name, help).expect("metric can be created");
  REGISTRY.register(Box::new(c.clone())).ok();
  c
}

pub static SESSIONS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
  let g = IntGauge::new("sessions_running", "Number of decoder sessions currently running").expect("metric can be created");
  REGISTRY.register(Box::new(g.clone())).ok();
  g
});

pub static DECODER_SPAWN_FAILURES_TOTAL: Lazy<IntCounter> =
  Lazy::new(|| counter("decoder_spawn_failures_total", "Total decoder processes that failed to start"));

pub static FRAMES_DELIVERED_TOTAL: Lazy<IntCounter> =
  Lazy::new(|| counter("frames_delivered_total", "Total decoded frames handed to the display"));

pub static FRAMES_DROPPED_TOTAL: Lazy<IntCounter> =
  Lazy::new(|| counter("frames_dropped_total", "Total decoded frames dropped because the display slot was full"));

pub static FRAMES_MALFORMED_TOTAL: Lazy<IntCounter> =
  Lazy::new(|| counter("frames_malformed_total", "Total frames that failed to decode"));

pub fn render() -> String {
  let mut buf = Vec::new();
  let encoder = TextEncoder::new();
  let mfs = REGISTRY.gather();
  encoder.encode(&mfs, &mut buf).ok();
  String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_lists_registered_metrics() {
    FRAMES_DELIVERED_TOTAL.inc();
    SESSIONS_RUNNING.set(SESSIONS_RUNNING.get());
    let text = render();
    assert!(text.contains("frames_delivered_total"));
    assert!(text.contains("sessions_running"));
  }
}
