//! Wall-power budget allocation
//!
//! Maps the raw per-zone PID outputs onto a duty pair whose combined
//! wattage never exceeds the selected circuit budget. The lower zone has
//! priority: it feeds the stone the dough sits on, and a cold stone is the
//! failure mode that ruins a pizza. Integer arithmetic throughout.

use crate::config::{RATED_LO_W, RATED_UP_W};

/// Allocate the wall-power budget between the two elements.
///
/// `up_raw` / `lo_raw` are raw PID outputs (0..=255), `limit_w` the
/// breaker budget in watts. `boosting` is true during the opening seconds
/// of a bake, when the lower zone may consume the entire budget to fight
/// dough-induced cooling.
///
/// Returns `(up_duty, lo_duty)` such that
/// `up_duty * RATED_UP_W / 255 + lo_duty * RATED_LO_W / 255 <= limit_w`.
pub fn allocate(up_raw: u8, lo_raw: u8, limit_w: i32, boosting: bool) -> (u8, u8) {
    let up_req_w = i32::from(up_raw) * RATED_UP_W / 255;
    let lo_req_w = i32::from(lo_raw) * RATED_LO_W / 255;

    let (up_w, lo_w) = if boosting {
        // Explicit two-step: the lower zone may take everything, the upper
        // zone gets whatever headroom is left.
        let lo_active_w = limit_w.min(lo_req_w);
        let up_max_w = (limit_w - lo_active_w).max(0);
        (up_req_w.min(up_max_w), lo_active_w)
    } else {
        let lo_w = lo_req_w.min(limit_w);
        let rem_w = (limit_w - lo_w).max(0);
        (up_req_w.min(rem_w), lo_w)
    };

    ((up_w * 255 / RATED_UP_W) as u8, (lo_w * 255 / RATED_LO_W) as u8)
}
