//! Concurrency segmentation for pairing / mob attribution.
//!
//! An assignment's clipped interval is cut at every boundary of the other
//! assignments active in the same transition. Each piece knows how many
//! distinct members were assigned during it, which drives the per-member
//! share.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use flowlens_core::Interval;
use flowlens_core::calendar::{wall_clock_hours, working_day_hours};

/// A piece of an assignment's clipped interval with constant concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub interval: Interval,
    /// Distinct members assigned during the whole piece, including the owner.
    pub concurrency: usize,
}

/// What the owner keeps of its attributable hours after pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairingShare {
    pub factor: f64,
    /// Most members assigned at once during the counted time.
    pub members: usize,
}

/// Split `clip` wherever one of `active` starts or ends.
///
/// `active` pairs each clipped assignment interval of the transition with
/// its member id, `clip` itself included. A member holding two overlapping
/// assignments counts once.
#[must_use]
pub fn concurrency_segments(clip: &Interval, active: &[(&str, Interval)]) -> Vec<Segment> {
    let mut cuts: Vec<DateTime<Utc>> = vec![clip.start, clip.end];
    for (_, other) in active {
        for boundary in [other.start, other.end] {
            if clip.start < boundary && boundary < clip.end {
                cuts.push(boundary);
            }
        }
    }
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .filter_map(|pair| Interval::new(pair[0], pair[1]))
        .map(|interval| {
            let members: BTreeSet<&str> = active
                .iter()
                .filter(|(_, other)| other.start <= interval.start && interval.end <= other.end)
                .map(|(member, _)| *member)
                .collect();
            Segment {
                interval,
                concurrency: members.len().max(1),
            }
        })
        .collect()
}

/// Share of the owner's attributable hours it keeps after pairing.
///
/// Solo time keeps everything. Time shared by `n > 1` members keeps
/// `pairing / n`. Pieces are weighted by their unblocked working-day hours,
/// so overlap on weekends never splits weekday effort. Spans without any
/// working-day time (a weekend afternoon) fall back to wall-clock weights.
#[must_use]
pub fn pairing_share(segments: &[Segment], blocked: &[Interval], pairing: f64) -> PairingShare {
    let free: Vec<(usize, Vec<Interval>)> = segments
        .iter()
        .map(|segment| (segment.concurrency, segment.interval.subtract(blocked)))
        .collect();

    weighted_share(&free, pairing, working_day_hours)
        .or_else(|| weighted_share(&free, pairing, wall_clock_hours))
        .unwrap_or_else(|| {
            let members = max_concurrency(segments);
            PairingShare {
                factor: member_share(members, pairing),
                members,
            }
        })
}

fn weighted_share(
    free: &[(usize, Vec<Interval>)],
    pairing: f64,
    hours: fn(DateTime<Utc>, DateTime<Utc>) -> f64,
) -> Option<PairingShare> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    let mut members = 1;

    for (concurrency, pieces) in free {
        let weight: f64 = pieces.iter().map(|piece| hours(piece.start, piece.end)).sum();
        if weight <= 0.0 {
            continue;
        }
        total += weight;
        weighted += weight * member_share(*concurrency, pairing);
        members = members.max(*concurrency);
    }

    (total > 0.0).then(|| PairingShare {
        factor: weighted / total,
        members,
    })
}

#[must_use]
pub fn max_concurrency(segments: &[Segment]) -> usize {
    segments
        .iter()
        .map(|segment| segment.concurrency)
        .max()
        .unwrap_or(1)
}

#[allow(clippy::cast_precision_loss)]
fn member_share(concurrency: usize, pairing: f64) -> f64 {
    if concurrency > 1 {
        pairing / concurrency as f64
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        // January 2024: the 8th is a Monday, the 13th a Saturday.
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0)
            .single()
            .expect("valid date")
    }

    fn iv(a: u32, b: u32) -> Interval {
        Interval::new(at(8, a), at(8, b)).expect("non-empty")
    }

    fn factor(segments: &[Segment], blocked: &[Interval], pairing: f64) -> f64 {
        pairing_share(segments, blocked, pairing).factor
    }

    #[test]
    fn solo_assignment_is_one_segment() {
        let clip = iv(9, 17);
        let segments = concurrency_segments(&clip, &[("ana", clip)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].concurrency, 1);
        assert!((factor(&segments, &[], 0.8) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn full_overlap_halves_share() {
        let clip = iv(9, 17);
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", clip)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].concurrency, 2);
        assert!((factor(&segments, &[], 1.0) - 0.5).abs() < 1e-9);
        assert!((factor(&segments, &[], 0.5) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn partial_overlap_is_weighted_by_time() {
        let clip = iv(9, 17);
        let other = iv(13, 20);
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", other)]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].concurrency, 1);
        assert_eq!(segments[1].concurrency, 2);
        // 4h solo + 4h shared at 1/2 => 6 / 8
        let share = pairing_share(&segments, &[], 1.0);
        assert!((share.factor - 0.75).abs() < 1e-9);
        assert_eq!(share.members, 2);
    }

    #[test]
    fn same_member_twice_is_not_pairing() {
        let clip = iv(9, 17);
        let segments = concurrency_segments(&clip, &[("ana", clip), ("ana", iv(10, 12))]);
        assert!(segments.iter().all(|segment| segment.concurrency == 1));
        assert!((factor(&segments, &[], 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blocked_time_does_not_weigh_in() {
        let clip = iv(9, 17);
        let other = iv(13, 17);
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", other)]);
        // The shared afternoon is blocked, only solo time remains.
        let share = pairing_share(&segments, &[iv(13, 17)], 1.0);
        assert!((share.factor - 1.0).abs() < 1e-9);
        assert_eq!(share.members, 1);
    }

    #[test]
    fn weekend_overlap_leaves_weekday_share_whole() {
        let clip = Interval::new(at(12, 9), at(15, 17)).expect("fri to mon");
        let weekend = Interval::new(at(13, 0), at(15, 0)).expect("sat to mon");
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", weekend)]);
        assert_eq!(max_concurrency(&segments), 2);

        let share = pairing_share(&segments, &[], 1.0);
        assert!((share.factor - 1.0).abs() < 1e-9);
        assert_eq!(share.members, 1);
    }

    #[test]
    fn weekend_only_work_uses_wall_clock_weights() {
        let clip = Interval::new(at(13, 9), at(13, 17)).expect("saturday");
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", clip)]);
        assert!((factor(&segments, &[], 1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fully_blocked_falls_back_to_concurrency_share() {
        let clip = iv(9, 17);
        let segments = concurrency_segments(&clip, &[("ana", clip), ("bo", clip)]);
        let share = pairing_share(&segments, &[iv(8, 18)], 1.0);
        assert!((share.factor - 0.5).abs() < 1e-9);
        assert_eq!(share.members, 2);
    }
}
