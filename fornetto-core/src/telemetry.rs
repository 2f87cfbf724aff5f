//! Serial telemetry line
//!
//! One line per second over the 115200-baud console, plotter-friendly
//! space-separated key:value pairs. Field order is part of the contract.

use core::fmt::Write;

use heapless::String;

use crate::oven::StatusView;

/// Worst-case line length with all fields at full width
pub const LINE_CAP: usize = 160;

/// Format the per-second telemetry line.
///
/// `US`/`LS` report 0 when the oven is not heating and the tune target
/// while tuning; `ST` is the state ordinal; `LM` the selected budget in
/// watts.
pub fn format_line(v: &StatusView) -> String<LINE_CAP> {
    let mut line = String::new();
    let _ = write!(
        line,
        "US:{:.2} LS:{:.2} UP:{:.2} LP:{:.2} UH:{:.2} LH:{:.2} UW:{} LW:{} SK:{:.2} ST:{} LM:{}",
        v.up_set_c,
        v.lo_set_c,
        v.up_plate_c,
        v.lo_plate_c,
        v.up_heater_c,
        v.lo_heater_c,
        v.up_duty,
        v.lo_duty,
        v.soak_min,
        v.state.ordinal(),
        v.limit_w,
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OvenState;

    fn sample_view() -> StatusView {
        StatusView {
            state: OvenState::Preheat,
            up_set_c: 500.0,
            lo_set_c: 430.0,
            up_plate_c: 312.5,
            lo_plate_c: 298.25,
            up_heater_c: 640.0,
            lo_heater_c: 555.5,
            up_duty: 255,
            lo_duty: 128,
            soak_min: 42.75,
            limit_w: 1420,
            limit_label: "1.4kW",
            recipe_name: "Napoli",
            bake_remaining_s: None,
            up_wear: 100.0,
            lo_wear: 100.0,
            maintenance: false,
            prompt: None,
            message: "Soaking...",
        }
    }

    #[test]
    fn line_format_and_field_order() {
        let line = format_line(&sample_view());
        assert_eq!(
            line.as_str(),
            "US:500.00 LS:430.00 UP:312.50 LP:298.25 UH:640.00 LH:555.50 \
             UW:255 LW:128 SK:42.75 ST:1 LM:1420"
        );
    }

    #[test]
    fn line_fits_capacity_at_full_width() {
        let mut v = sample_view();
        v.up_set_c = 650.125;
        v.lo_set_c = 650.125;
        v.up_plate_c = 650.125;
        v.lo_plate_c = 650.125;
        v.up_heater_c = 920.125;
        v.lo_heater_c = 920.125;
        v.soak_min = 100.0;
        v.state = OvenState::Tuning;
        let line = format_line(&v);
        assert!(line.len() < LINE_CAP);
        assert!(line.as_str().ends_with("ST:9 LM:1420"));
    }
}
