use crate::collectors::{DiskDevices, NetInterfaces};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// `(current - previous) / elapsed_secs`.
///
/// A counter that went backwards (reset, wrap, driver reload) yields 0.0 rather than a
/// negative throughput. A non-positive window also yields 0.0.
pub fn rate(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    if !(elapsed_secs.is_finite() && elapsed_secs > 0.0) {
        return 0.0;
    }
    match current.checked_sub(previous) {
        Some(delta) => delta as f64 / elapsed_secs,
        None => 0.0,
    }
}

/// Last-seen values of the monotonic counters, per device, the baseline for the next rate.
///
/// A family stays `None` until its first successful read; the first read after that
/// only sets the baseline. Within a family, a device seen for the first time only
/// contributes from the following cycle, and a device that vanished is forgotten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    disk: Option<DiskDevices>,
    net: Option<NetInterfaces>,
}

impl CounterState {
    pub fn primed(disk: Option<DiskDevices>, net: Option<NetInterfaces>) -> Self {
        Self { disk, net }
    }

    pub fn disk(&self) -> Option<&DiskDevices> {
        self.disk.as_ref()
    }

    pub fn net(&self) -> Option<&NetInterfaces> {
        self.net.as_ref()
    }

    /// Returns `(read, write)` bytes/sec summed over the devices present in both the
    /// baseline and `now`, then stores `now`.
    pub fn advance_disk(&mut self, now: DiskDevices, elapsed_secs: f64) -> Option<(f64, f64)> {
        let prev = self.disk.replace(now)?;
        let now = self.disk.as_ref()?;
        Some(summed_rates("disk", &prev, now, elapsed_secs, |d| {
            (d.read_bytes, d.write_bytes)
        }))
    }

    /// Returns `(sent, recv)` bytes/sec summed over the interfaces present in both the
    /// baseline and `now`, then stores `now`.
    pub fn advance_net(&mut self, now: NetInterfaces, elapsed_secs: f64) -> Option<(f64, f64)> {
        let prev = self.net.replace(now)?;
        let now = self.net.as_ref()?;
        Some(summed_rates("net", &prev, now, elapsed_secs, |n| {
            (n.sent_bytes, n.recv_bytes)
        }))
    }
}

fn summed_rates<T>(
    family: &'static str,
    prev: &BTreeMap<String, T>,
    now: &BTreeMap<String, T>,
    elapsed_secs: f64,
    pair: impl Fn(&T) -> (u64, u64),
) -> (f64, f64) {
    let (mut a, mut b) = (0u64, 0u64);
    for (device, current) in now {
        let Some(previous) = prev.get(device) else {
            debug!(family, device = %device, "new device; baseline set");
            continue;
        };
        let (ca, cb) = pair(current);
        let (pa, pb) = pair(previous);
        a = a.saturating_add(delta(family, device, ca, pa));
        b = b.saturating_add(delta(family, device, cb, pb));
    }
    (rate(a, 0, elapsed_secs), rate(b, 0, elapsed_secs))
}

fn delta(family: &'static str, device: &str, current: u64, previous: u64) -> u64 {
    current.checked_sub(previous).unwrap_or_else(|| {
        warn!(
            family,
            device, current, previous, "counter went backwards; reporting 0 and rebasing"
        );
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{DiskIo, NetIo};
    use proptest::prelude::*;

    fn disks(entries: &[(&str, u64, u64)]) -> DiskDevices {
        entries
            .iter()
            .map(|(n, r, w)| (n.to_string(), DiskIo { read_bytes: *r, write_bytes: *w }))
            .collect()
    }

    fn nets(entries: &[(&str, u64, u64)]) -> NetInterfaces {
        entries
            .iter()
            .map(|(n, s, r)| (n.to_string(), NetIo { sent_bytes: *s, recv_bytes: *r }))
            .collect()
    }

    proptest! {
        #[test]
        fn rate_is_delta_over_window(a in 0u64..1u64 << 52, d in 0u64..1u64 << 40, elapsed in 0.001f64..1e6) {
            let b = a + d;
            let r = rate(b, a, elapsed);
            prop_assert!((r - d as f64 / elapsed).abs() <= 1e-9 * r.abs().max(1.0));
            prop_assert_eq!(rate(a, a, elapsed), 0.0);
        }

        #[test]
        fn rate_never_negative(a in any::<u64>(), b in any::<u64>(), elapsed in 0.001f64..1e6) {
            prop_assert!(rate(b, a, elapsed) >= 0.0);
        }
    }

    #[test]
    fn regression_clamps_and_rebases() {
        let mut st = CounterState::primed(Some(disks(&[("sda", 5000, 10)])), None);
        let r = st.advance_disk(disks(&[("sda", 100, 30)]), 10.0);
        assert_eq!(r, Some((0.0, 2.0)));
        assert_eq!(st.disk(), Some(&disks(&[("sda", 100, 30)])));
        let r = st.advance_disk(disks(&[("sda", 200, 30)]), 10.0);
        assert_eq!(r, Some((10.0, 0.0)));
    }

    #[test]
    fn devices_coming_and_going_do_not_distort_rates() {
        let mut st = CounterState::primed(Some(disks(&[("vda", 1000, 0), ("vdb", 5000, 0)])), None);

        // vdb unmounted while vda read 2000 bytes.
        let r = st.advance_disk(disks(&[("vda", 3000, 0)]), 10.0);
        assert_eq!(r, Some((200.0, 0.0)));

        // vdb back with its lifetime total, vda idle.
        let r = st.advance_disk(disks(&[("vda", 3000, 0), ("vdb", 5000, 0)]), 10.0);
        assert_eq!(r, Some((0.0, 0.0)));

        // Both now have baselines again.
        let r = st.advance_disk(disks(&[("vda", 3100, 0), ("vdb", 5100, 0)]), 10.0);
        assert_eq!(r, Some((20.0, 0.0)));
    }

    #[test]
    fn one_interface_reset_leaves_the_others_counted() {
        let mut st = CounterState::primed(None, Some(nets(&[("eth0", 900, 0), ("wg0", 50, 0)])));
        let r = st.advance_net(nets(&[("eth0", 1900, 0), ("wg0", 0, 0)]), 1.0);
        assert_eq!(r, Some((1000.0, 0.0)));
    }

    #[test]
    fn unprimed_family_only_sets_baseline() {
        let mut st = CounterState::default();
        assert_eq!(st.advance_net(nets(&[("lo", 9, 9)]), 1.0), None);
        assert_eq!(st.advance_net(nets(&[("lo", 19, 9)]), 1.0), Some((10.0, 0.0)));
    }

    #[test]
    fn degenerate_window_is_zero() {
        assert_eq!(rate(10, 0, 0.0), 0.0);
        assert_eq!(rate(10, 0, f64::NAN), 0.0);
    }
}
