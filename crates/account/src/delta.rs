// Path: crates/account/src/delta.rs

//! Capacity arithmetic over a per-token [`Delta`].
//!
//! The channel's total value is `collateral + left_credit_limit +
//! right_credit_limit`. A [`CapacityView`] splits that total into six
//! components from one side's perspective; the grouping invariant
//! `in_capacity + out_capacity == total` holds for every delta and both
//! sides, and is what the consensus tiers re-check after every transaction.
//!
//! Orientation: the net transfer `d = ondelta + offdelta` is positive toward
//! the right side. Viewed from a side, components named `out_*` are value
//! currently positioned toward the counterparty (claimable by it), `in_*`
//! value positioned toward the viewer. `in_capacity` is therefore what the
//! viewer can still send, `out_capacity` what it can still receive.

use xln_types::account::Delta;
use xln_types::primitives::Side;

/// The six-way capacity split of one delta, from one side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityView {
    /// Collateral still on the viewer's side.
    pub in_collateral: u128,
    /// Collateral pushed toward the counterparty.
    pub out_collateral: u128,
    /// Viewer-extended credit drawn by the counterparty.
    pub in_own_credit: u128,
    /// Viewer-extended credit still undrawn.
    pub out_own_credit: u128,
    /// Counterparty-extended credit still undrawn.
    pub in_peer_credit: u128,
    /// Counterparty-extended credit drawn by the viewer.
    pub out_peer_credit: u128,
    /// Spendable headroom: `in_own_credit + in_collateral + in_peer_credit`.
    pub in_capacity: u128,
    /// Receivable headroom: `out_peer_credit + out_collateral + out_own_credit`.
    pub out_capacity: u128,
}

fn clamp_u128(v: i128, hi: u128) -> u128 {
    if v <= 0 {
        0
    } else {
        (v as u128).min(hi)
    }
}

/// Derives the capacity view of `delta` from `side`.
pub fn derive_capacity(delta: &Delta, side: Side) -> CapacityView {
    let (own_limit, peer_limit) = match side {
        Side::Left => (delta.left_credit_limit, delta.right_credit_limit),
        Side::Right => (delta.right_credit_limit, delta.left_credit_limit),
    };
    // Orient the net transfer so that positive means "pushed out by viewer".
    let d = match side {
        Side::Left => delta.sum(),
        Side::Right => -delta.sum(),
    };
    let collateral = delta.collateral;

    let out_collateral = clamp_u128(d, collateral);
    let in_collateral = collateral - out_collateral;
    let in_own_credit = clamp_u128(-d, own_limit);
    let out_own_credit = own_limit - in_own_credit;
    let out_peer_credit = clamp_u128(d - collateral as i128, peer_limit);
    let in_peer_credit = peer_limit - out_peer_credit;

    CapacityView {
        in_collateral,
        out_collateral,
        in_own_credit,
        out_own_credit,
        in_peer_credit,
        out_peer_credit,
        in_capacity: in_own_credit + in_collateral + in_peer_credit,
        out_capacity: out_peer_credit + out_collateral + out_own_credit,
    }
}

/// The channel's total value: what the two capacities must always sum to.
pub fn total_capacity(delta: &Delta) -> u128 {
    delta.collateral + delta.left_credit_limit + delta.right_credit_limit
}

/// Whether the net transfer sits inside the band credit limits allow:
/// `-left_credit_limit <= d <= collateral + right_credit_limit`.
///
/// Settlement overrides may push `d` outside the band (they are
/// authoritative); new payments may not.
pub fn within_credit_band(delta: &Delta) -> bool {
    let d = delta.sum();
    let lower = -(delta.left_credit_limit as i128);
    let upper = delta.collateral as i128 + delta.right_credit_limit as i128;
    d >= lower && d <= upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(collateral: u128, ondelta: i128, offdelta: i128, left: u128, right: u128) -> Delta {
        Delta {
            collateral,
            ondelta,
            offdelta,
            left_credit_limit: left,
            right_credit_limit: right,
            ..Default::default()
        }
    }

    fn assert_conservation(d: &Delta) {
        for side in [Side::Left, Side::Right] {
            let view = derive_capacity(d, side);
            assert_eq!(
                view.in_capacity + view.out_capacity,
                total_capacity(d),
                "conservation failed for {:?} at d={}",
                side,
                d.sum()
            );
        }
    }

    #[test]
    fn conservation_across_the_band() {
        let cases = [
            delta(0, 0, 0, 1000, 1000),
            delta(0, 0, 100, 1000, 1000),
            delta(500, 100, -50, 0, 0),
            delta(500, 0, 500, 200, 300),
            delta(500, 0, -200, 200, 300),
            delta(500, 0, 800, 200, 300),
        ];
        for d in &cases {
            assert_conservation(d);
        }
    }

    #[test]
    fn unsecured_payment_uses_peer_credit() {
        // collateral=0, both limits 1000, left has paid 100.
        let d = delta(0, 0, 100, 1000, 1000);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.out_collateral, 0);
        assert_eq!(left.out_peer_credit, 100);
        assert_eq!(left.in_capacity, 900);
        assert_eq!(left.out_capacity, 1100);

        let right = derive_capacity(&d, Side::Right);
        assert_eq!(right.in_own_credit, 100);
        assert_eq!(right.in_capacity, 1100);
        assert_eq!(right.out_capacity, 900);
    }

    #[test]
    fn boundary_at_zero() {
        let d = delta(500, 0, 0, 200, 300);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.out_collateral, 0);
        assert_eq!(left.in_collateral, 500);
        assert_eq!(left.in_own_credit, 0);
        assert_eq!(left.out_peer_credit, 0);
        assert_conservation(&d);
    }

    #[test]
    fn boundary_at_collateral() {
        let d = delta(500, 0, 500, 200, 300);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.out_collateral, 500);
        assert_eq!(left.in_collateral, 0);
        assert_eq!(left.out_peer_credit, 0);
        assert_conservation(&d);
    }

    #[test]
    fn boundary_at_own_credit_limit() {
        // d = -left_credit_limit: left's extended credit fully drawn.
        let d = delta(500, 0, -200, 200, 300);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.in_own_credit, 200);
        assert_eq!(left.out_own_credit, 0);
        assert_eq!(left.in_collateral, 500);
        assert!(within_credit_band(&d));
        assert_conservation(&d);
    }

    #[test]
    fn boundary_at_full_extension() {
        // d = collateral + right_credit_limit: nothing left to send.
        let d = delta(500, 0, 800, 200, 300);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.out_collateral, 500);
        assert_eq!(left.out_peer_credit, 300);
        assert_eq!(left.in_capacity, 0);
        assert!(within_credit_band(&d));
        assert_conservation(&d);
    }

    #[test]
    fn clamps_hold_beyond_the_band() {
        // A settlement override can leave d outside the credit band; the
        // capacity split still conserves.
        let d = delta(100, 900, 0, 50, 50);
        assert!(!within_credit_band(&d));
        assert_conservation(&d);
        let left = derive_capacity(&d, Side::Left);
        assert_eq!(left.out_peer_credit, 50);
        assert_eq!(left.in_capacity, 0);
    }

    #[test]
    fn sides_mirror_each_other() {
        let d = delta(500, 40, 60, 200, 300);
        let left = derive_capacity(&d, Side::Left);
        let right = derive_capacity(&d, Side::Right);
        assert_eq!(left.in_capacity, right.out_capacity);
        assert_eq!(left.out_capacity, right.in_capacity);
    }
}
