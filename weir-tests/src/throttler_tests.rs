//! End-to-end convergence scenarios for the tag throttler.
//!
//! Each scenario builds a 10-server mock cluster, attaches client workloads
//! with fixed desired TPS and per-transaction cost, and asserts that the
//! published per-client limit settles at the expected equilibrium: three
//! consecutive 1-second checks within 1 TPS, inside 300 simulated seconds.

use weir_core::{Priority, Quota, Tag};

use crate::sim::{SimClient, Simulation};

/// Convergence budget, in simulated seconds.
const MAX_SECONDS: u64 = 300;

fn tag(name: &str) -> Tag {
    Tag::from(name)
}

#[test]
fn test_simple_read_quota() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));

    // 100 bytes/sec of quota at 6 bytes/transaction.
    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_write_direction_quota() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(0, 100));
    sim.add_client(SimClient::write(t.clone(), 5.0, 6.0));

    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_two_tags_share_headroom() {
    let mut sim = Simulation::new(10, 100.0);
    let t1 = tag("sampleTag1");
    let t2 = tag("sampleTag2");
    sim.set_quota(&t1, Quota::with_totals(100, 0));
    sim.set_quota(&t2, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t1.clone(), 5.0, 6.0));
    sim.add_client(SimClient::read(t2.clone(), 5.0, 6.0));

    let expected = 100.0 / 6.0;
    assert!(sim.run_until_stable_all(
        &[(t1, Some(expected)), (t2, Some(expected))],
        MAX_SECONDS
    ));
}

#[test]
fn test_demand_above_quota() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 20.0, 10.0));

    // The quota admits exactly 10 transactions/sec at 10 bytes each.
    assert!(sim.run_until_stable(&t, Some(10.0), MAX_SECONDS));
}

#[test]
fn test_two_clients_one_tag() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));

    // Combined demand stays under quota; each client keeps the full
    // per-client headroom.
    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_skewed_clients_split_target() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 5.0));
    sim.add_client(SimClient::read(t.clone(), 25.0, 5.0));

    // Aggregate target is 20 tps; the slow client takes 5, so the uniform
    // per-client limit settles at 15.
    assert!(sim.run_until_stable(&t, Some(15.0), MAX_SECONDS));
}

#[test]
fn test_remove_quota_after_convergence() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));
    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));

    sim.remove_quota(&t);
    assert!(sim.run_until_stable(&t, None, MAX_SECONDS));
}

#[test]
fn test_update_quota_reconverges() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));
    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));

    sim.set_quota(&t, Quota::with_totals(50, 0));
    assert!(sim.run_until_stable(&t, Some(50.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_active_cluster_throttling() {
    // Per-server capacity of 5 bytes/sec caps the cluster at 50, well under
    // the 100 the quota would allow.
    let mut sim = Simulation::new(10, 5.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 10.0, 6.0));

    assert!(sim.run_until_stable(&t, Some(50.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_two_tags_proportional_split_under_throttling() {
    let mut sim = Simulation::new(10, 5.0);
    let t1 = tag("sampleTag1");
    let t2 = tag("sampleTag2");
    sim.set_quota(&t1, Quota::with_totals(50, 0));
    sim.set_quota(&t2, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t1.clone(), 10.0, 6.0));
    sim.add_client(SimClient::read(t2.clone(), 10.0, 6.0));

    // The 50-capacity cluster splits by quota share: one third vs two thirds
    // of the 50/6 aggregate.
    let aggregate = 50.0 / 6.0;
    assert!(sim.run_until_stable_all(
        &[
            (t1, Some(aggregate / 3.0)),
            (t2, Some(2.0 * aggregate / 3.0)),
        ],
        MAX_SECONDS
    ));
}

#[test]
fn test_reserved_read_quota_floor() {
    let mut sim = Simulation::new(10, 5.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0).with_reserved_read(70));
    sim.add_client(SimClient::read(t.clone(), 10.0, 6.0));

    // Storage health would cap the tag at 50/6, but the reservation
    // guarantees 70 bytes/sec regardless of saturation.
    assert!(sim.run_until_stable(&t, Some(70.0 / 6.0), MAX_SECONDS));
}

#[test]
fn test_reserved_write_quota_floor() {
    let mut sim = Simulation::new(10, 5.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(0, 100).with_reserved_write(70));
    sim.add_client(SimClient::write(t.clone(), 10.0, 6.0));

    assert!(sim.run_until_stable(&t, Some(70.0 / 6.0), MAX_SECONDS));
}

// -----------------------------------------------------------------------------
// Invariants
// -----------------------------------------------------------------------------

#[test]
fn test_published_map_is_all_or_nothing() {
    let mut sim = Simulation::new(10, 100.0);
    let quotaed = tag("quotaed");
    let stray = tag("stray");
    sim.set_quota(&quotaed, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(quotaed.clone(), 5.0, 6.0));
    sim.add_client(SimClient::read(stray.clone(), 5.0, 6.0));

    // While an unquotaed tag is under management, nothing is published.
    for _ in 0..30 {
        sim.step_second();
        assert!(sim.published_tps(&quotaed).is_none());
        assert!(sim.published_tps(&stray).is_none());
    }

    // Granting the stray tag a quota makes the map cover both tags.
    sim.set_quota(&stray, Quota::with_totals(100, 0));
    let expected = 100.0 / 6.0;
    assert!(sim.run_until_stable_all(
        &[
            (quotaed.clone(), Some(expected)),
            (stray.clone(), Some(expected)),
        ],
        MAX_SECONDS
    ));
}

#[test]
fn test_published_limits_respect_floor_and_target() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 20.0, 10.0));

    // Every published limit respects the configured floor; once the cost
    // smoothers have settled, it also stays at or below the quota-derived
    // ceiling (plus smoothing ripple).
    for second in 0..120 {
        sim.step_second();
        if let Some(tps) = sim.published_tps(&t) {
            assert!(tps >= 1.0, "published {tps} below floor");
            if second >= 30 {
                assert!(tps <= 11.0, "published {tps} above quota-derived target");
            }
        }
    }
}

#[test]
fn test_tag_statistics_track_management_set() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    assert_eq!(sim.throttler().auto_throttle_count(), 0);
    sim.set_quota(&t, Quota::with_totals(100, 0));
    assert_eq!(sim.throttler().auto_throttle_count(), 1);
    assert!(sim.throttler().is_auto_throttling_enabled());
    assert_eq!(sim.throttler().busy_read_tag_count(), 0);
    assert_eq!(sim.throttler().busy_write_tag_count(), 0);
    assert_eq!(sim.throttler().manual_throttle_count(), 0);
}

#[test]
fn test_both_priorities_published_identically() {
    let mut sim = Simulation::new(10, 100.0);
    let t = tag("sampleTag1");
    sim.set_quota(&t, Quota::with_totals(100, 0));
    sim.add_client(SimClient::read(t.clone(), 5.0, 6.0));
    assert!(sim.run_until_stable(&t, Some(100.0 / 6.0), MAX_SECONDS));

    let map = sim.published_map();
    let batch = &map[&Priority::Batch];
    let default = &map[&Priority::Default];
    assert_eq!(batch.len(), default.len());
    for (tag, limit) in batch {
        let other = &default[tag];
        assert_eq!(limit.tps, other.tps);
        assert!(limit.expiration_us.is_none());
    }
}
