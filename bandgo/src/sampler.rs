use crate::counters::{CounterSource, Counters, Snapshot};
use crate::terminal::LiveRegion;
use anyhow::{Context, Result};
use bandgo_util::readable_bytes;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Bytes moved on one interface during the last interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRate {
    pub name: String,
    pub recv: u64,
    pub sent: u64,
}

/// Everything shown on screen for one tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub elapsed: Duration,
    pub rates: Vec<InterfaceRate>,
    pub total_recv: u64,
    pub total_sent: u64,
    pub workers: usize,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_secs(self.elapsed.as_secs_f64().round() as u64);
        writeln!(f, "Elapsed: {}", humantime::format_duration(elapsed))?;
        writeln!(f)?;
        writeln!(f, "Current Traffic Rates:")?;
        writeln!(f, "{:<12} {:<15} {:<15}", "Interface", "Download", "Upload")?;
        writeln!(f, "----------------------------------------")?;
        for rate in &self.rates {
            writeln!(
                f,
                "{:<12} {:<15} {:<15}",
                rate.name,
                format!("{}/s", readable_bytes(rate.recv)),
                format!("{}/s", readable_bytes(rate.sent)),
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Traffic Totals:")?;
        writeln!(f, "Total Downloaded: {}", readable_bytes(self.total_recv))?;
        writeln!(f, "Total Uploaded:   {}", readable_bytes(self.total_sent))?;
        writeln!(f)?;
        writeln!(f, "Concurrent Workers: {}", self.workers)
    }
}

/// Turns cumulative interface counters into per-interval rates and running totals.
pub struct Sampler<S> {
    source: S,
    previous: Snapshot,
    total_recv: u64,
    total_sent: u64,
    started: Instant,
    workers: usize,
}

impl<S: CounterSource> Sampler<S> {
    /// Takes the baseline sample right away.
    pub fn new(mut source: S, workers: usize) -> Self {
        let previous = read_or_empty(&mut source);
        Self {
            source,
            previous,
            total_recv: 0,
            total_sent: 0,
            started: Instant::now(),
            workers,
        }
    }

    #[inline]
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        (self.total_recv, self.total_sent)
    }

    pub fn tick(&mut self) -> Frame {
        let current = read_or_empty(&mut self.source);
        let mut rates = Vec::with_capacity(current.len());
        for (name, now) in &current {
            if now.is_zero() {
                continue;
            }
            let (recv, sent) = match self.previous.get(name) {
                Some(before) => (delta(now.recv, before.recv), delta(now.sent, before.sent)),
                // first sighting, this read is its baseline
                None => (0, 0),
            };
            self.total_recv = self.total_recv.saturating_add(recv);
            self.total_sent = self.total_sent.saturating_add(sent);
            rates.push(InterfaceRate {
                name: name.clone(),
                recv,
                sent,
            });
        }
        self.previous = current;
        Frame {
            elapsed: self.started.elapsed(),
            rates,
            total_recv: self.total_recv,
            total_sent: self.total_sent,
            workers: self.workers,
        }
    }

    /// Redraws `region` every [`SAMPLE_INTERVAL`] until `shutdown` fires.
    pub async fn run<W: Write>(
        mut self,
        target: &str,
        region: &mut LiveRegion<W>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        region
            .println("Traffic Monitor")
            .and_then(|()| region.println(&format!("Target: {target}")))
            .context("Failed to write traffic monitor header")?;
        // first frame one full interval after the baseline
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + SAMPLE_INTERVAL, SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let frame = self.tick();
                    region
                        .redraw(&frame.to_string())
                        .context("Failed to redraw traffic frame")?;
                }
            }
        }
        region.reset().context("Failed to reset terminal")
    }
}

fn read_or_empty<S: CounterSource>(source: &mut S) -> Snapshot {
    source.read().unwrap_or_else(|e| {
        debug!(error = %e, "Failed to read interface counters");
        Snapshot::new()
    })
}

/// A counter that went backwards was reset, everything it shows now is new.
#[inline]
fn delta(now: u64, before: u64) -> u64 {
    if now >= before {
        now - before
    } else {
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<Snapshot>>);

    impl CounterSource for Scripted {
        fn read(&mut self) -> Result<Snapshot> {
            self.0.pop_front().unwrap_or_else(|| Ok(Snapshot::new()))
        }
    }

    fn snap(entries: &[(&str, u64, u64)]) -> Snapshot {
        entries
            .iter()
            .map(|&(name, recv, sent)| (name.to_string(), Counters::new(recv, sent)))
            .collect()
    }

    fn sampler(reads: Vec<Result<Snapshot>>) -> Sampler<Scripted> {
        Sampler::new(Scripted(reads.into()), 16)
    }

    fn rate(name: &str, recv: u64, sent: u64) -> InterfaceRate {
        InterfaceRate {
            name: name.to_string(),
            recv,
            sent,
        }
    }

    #[test]
    fn first_tick_diffs_against_baseline() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 1000, 500)])),
            Ok(snap(&[("eth0", 2500, 900)])),
        ]);
        let frame = s.tick();
        assert_eq!(vec![rate("eth0", 1500, 400)], frame.rates);
        assert_eq!((1500, 400), s.totals());
        assert_eq!(1500, frame.total_recv);
        assert_eq!(400, frame.total_sent);
        assert_eq!(16, frame.workers);
    }

    #[test]
    fn totals_accumulate_across_interfaces_and_ticks() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 1000, 500), ("wlan0", 10, 10)])),
            Ok(snap(&[("eth0", 2000, 600), ("wlan0", 20, 30)])),
            Ok(snap(&[("eth0", 2500, 700), ("wlan0", 20, 30)])),
        ]);
        s.tick();
        let frame = s.tick();
        assert_eq!(
            vec![rate("eth0", 500, 100), rate("wlan0", 0, 0)],
            frame.rates
        );
        assert_eq!((1510, 220), s.totals());
    }

    #[test]
    fn idle_interfaces_are_hidden() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 100, 100), ("lo", 0, 0)])),
            Ok(snap(&[("eth0", 200, 100), ("lo", 0, 0)])),
        ]);
        let frame = s.tick();
        assert_eq!(vec![rate("eth0", 100, 0)], frame.rates);
    }

    #[test]
    fn new_interface_starts_from_zero() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 100, 100)])),
            Ok(snap(&[("eth0", 100, 100), ("tun0", 9000, 9000)])),
            Ok(snap(&[("eth0", 100, 100), ("tun0", 9100, 9050)])),
        ]);
        assert_eq!(rate("tun0", 0, 0), s.tick().rates[1]);
        assert_eq!(rate("tun0", 100, 50), s.tick().rates[1]);
        assert_eq!((100, 50), s.totals());
    }

    #[test]
    fn counter_reset_counts_from_zero() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 5000, 5000)])),
            Ok(snap(&[("eth0", 300, 7000)])),
        ]);
        let frame = s.tick();
        assert_eq!(vec![rate("eth0", 300, 2000)], frame.rates);
        assert_eq!((300, 2000), s.totals());
    }

    #[test]
    fn read_failure_renders_empty_frame() {
        let mut s = sampler(vec![
            Ok(snap(&[("eth0", 1000, 1000)])),
            Ok(snap(&[("eth0", 2000, 1000)])),
            Err(anyhow!("counters unavailable")),
            Ok(snap(&[("eth0", 9000, 1000)])),
            Ok(snap(&[("eth0", 9500, 1000)])),
        ]);
        s.tick();
        assert!(s.tick().rates.is_empty());
        assert_eq!((1000, 0), s.totals());
        assert_eq!(vec![rate("eth0", 0, 0)], s.tick().rates);
        assert_eq!(vec![rate("eth0", 500, 0)], s.tick().rates);
        assert_eq!((1500, 0), s.totals());
    }

    #[test]
    fn failed_baseline_is_empty() {
        let mut s = sampler(vec![
            Err(anyhow!("counters unavailable")),
            Ok(snap(&[("eth0", 2000, 1000)])),
        ]);
        assert_eq!(vec![rate("eth0", 0, 0)], s.tick().rates);
        assert_eq!((0, 0), s.totals());
    }

    #[test]
    fn frame_renders_rates_and_totals() {
        let frame = Frame {
            elapsed: Duration::from_millis(65_400),
            rates: vec![rate("eth0", 1500, 400)],
            total_recv: 1_048_576,
            total_sent: 1536,
            workers: 16,
        };
        let text = frame.to_string();
        assert!(text.starts_with("Elapsed: 1m 5s\n"));
        assert!(text.contains("eth0         1.465KB/s       400.000B/s"));
        assert!(text.contains("Total Downloaded: 1.000MB\n"));
        assert!(text.contains("Total Uploaded:   1.500KB\n"));
        assert!(text.ends_with("Concurrent Workers: 16\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn first_frame_waits_a_full_interval() {
        let s = sampler(vec![
            Ok(snap(&[("eth0", 1000, 500)])),
            Ok(snap(&[("eth0", 2500, 900)])),
        ]);
        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        let run = tokio::spawn(async move {
            let mut region = LiveRegion::new(Vec::new());
            s.run("http://some.website/", &mut region, shutdown).await.unwrap();
            String::from_utf8_lossy(region.get_ref()).into_owned()
        });

        tokio::time::sleep(SAMPLE_INTERVAL - Duration::from_millis(1)).await;
        cancel.cancel();
        let out = run.await.unwrap();
        assert!(!out.contains("Concurrent Workers"));
    }

    #[tokio::test(start_paused = true)]
    async fn frame_drawn_after_one_interval() {
        let s = sampler(vec![
            Ok(snap(&[("eth0", 1000, 500)])),
            Ok(snap(&[("eth0", 2500, 900)])),
        ]);
        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        let run = tokio::spawn(async move {
            let mut region = LiveRegion::new(Vec::new());
            s.run("http://some.website/", &mut region, shutdown).await.unwrap();
            String::from_utf8_lossy(region.get_ref()).into_owned()
        });

        tokio::time::sleep(SAMPLE_INTERVAL + Duration::from_millis(1)).await;
        cancel.cancel();
        let out = run.await.unwrap();
        assert_eq!(1, out.matches("Concurrent Workers: 16").count());
        assert!(out.contains("1.465KB/s"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_draws_until_cancelled() {
        let s = Sampler::new(
            Scripted(VecDeque::from([Ok(snap(&[("eth0", 1, 1)]))])),
            3,
        );
        let mut region = LiveRegion::new(Vec::new());
        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SAMPLE_INTERVAL + Duration::from_millis(50)).await;
            cancel.cancel();
        });
        s.run("http://some.website/", &mut region, shutdown)
            .await
            .unwrap();
        let out = String::from_utf8_lossy(region.get_ref()).into_owned();
        assert!(out.starts_with("Traffic Monitor\nTarget: http://some.website/\n"));
        assert!(out.contains("Concurrent Workers: 3"));
        assert!(out.contains("\x1b[?25h"));
    }
}
