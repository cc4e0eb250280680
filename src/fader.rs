//! Fader scaling - conversion between linear gain, decibels, and fader positions
//!
//! The DAW stores track volume as a linear gain scalar (1.0 = unity, up to 4.0).
//! The GUI dials it as a 12-bit fader position. The mapping runs through dB with
//! a three-segment curve that spends most of the fader travel on the audible
//! range while still reaching down to silence:
//!
//! - −100 dB .. −60 dB → first 10% of travel (ultra-fine near silence)
//! - −60 dB .. −20 dB  → next 30% of travel
//! - −20 dB .. +12 dB  → last 60% of travel
//!
//! Both directions are exact algebraic inverses, so a round trip through a
//! fader position loses at most one quantization step.

/// Fader resolution: 12-bit, positions 0..=4095
pub const RESOLUTION: u32 = 4096;

/// Floor of the usable dB range; values at or below map to silence
pub const MIN_DB: f64 = -100.0;

/// Ceiling of the usable dB range (+12 dB of boost)
pub const MAX_DB: f64 = 12.0;

/// Upper bound of the linear gain domain (4.0 ≈ +12 dB)
pub const MAX_VOLUME: f64 = 4.0;

// Segment boundaries of the travel curve
const SEG1_DB: f64 = -60.0;
const SEG2_DB: f64 = -20.0;
const SEG1_END: f64 = 0.1;
const SEG2_END: f64 = 0.4;

/// Convert a linear gain to decibels, clamped to `MIN_DB`.
///
/// Zero and negative gains map to the floor.
pub fn volume_to_db(volume: f64) -> f64 {
    if volume <= 0.0 {
        return MIN_DB;
    }
    (20.0 * volume.log10()).max(MIN_DB)
}

/// Convert decibels back to a linear gain; the floor maps to exact silence.
pub fn db_to_volume(db: f64) -> f64 {
    if db <= MIN_DB {
        return 0.0;
    }
    10f64.powf(db / 20.0)
}

/// Convert a linear gain to a fader position in `0..RESOLUTION`.
pub fn volume_to_position(volume: f64) -> u32 {
    if volume <= 0.0 {
        return 0;
    }

    let db = volume_to_db(volume).min(MAX_DB);

    let normalized = if db <= SEG1_DB {
        (db - MIN_DB) / (SEG1_DB - MIN_DB) * SEG1_END
    } else if db <= SEG2_DB {
        SEG1_END + (db - SEG1_DB) / (SEG2_DB - SEG1_DB) * (SEG2_END - SEG1_END)
    } else {
        SEG2_END + (db - SEG2_DB) / (MAX_DB - SEG2_DB) * (1.0 - SEG2_END)
    };

    let normalized = normalized.clamp(0.0, 1.0);
    (normalized * (RESOLUTION - 1) as f64).round() as u32
}

/// Convert a fader position back to a linear gain.
///
/// Exact inverse of [`volume_to_position`] up to integer rounding.
pub fn position_to_volume(position: u32) -> f64 {
    if position == 0 {
        return 0.0;
    }

    let normalized = position.min(RESOLUTION - 1) as f64 / (RESOLUTION - 1) as f64;

    let db = if normalized <= SEG1_END {
        MIN_DB + normalized / SEG1_END * (SEG1_DB - MIN_DB)
    } else if normalized <= SEG2_END {
        SEG1_DB + (normalized - SEG1_END) / (SEG2_END - SEG1_END) * (SEG2_DB - SEG1_DB)
    } else {
        SEG2_DB + (normalized - SEG2_END) / (1.0 - SEG2_END) * (MAX_DB - SEG2_DB)
    };

    db_to_volume(db)
}
