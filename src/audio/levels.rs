//! Volume level arithmetic shared by the step policy and level displays.
//!
//! macOS moves the volume in 16 standard steps, or 64 fine steps when
//! Shift+Option is held, so every standard step spans four fine steps.

/// Fine steps across the full range (1/64 each)
pub const FINE_STEPS: u32 = 64;

/// Standard steps across the full range (16 segments, 17 tick marks)
pub const STANDARD_STEPS: u32 = 16;

pub const FINE_STEPS_PER_STANDARD_STEP: u32 = FINE_STEPS / STANDARD_STEPS;

/// Values the system reports when stepping up from silence with the volume keys.
/// They drift slightly from exact sixteenths because of the hardware volume curve.
pub const STANDARD_VOLUME_LEVELS: [f32; 17] = [
    0.0,
    0.063488126,
    0.12555026,
    0.18755038,
    0.2539525,
    0.3125426,
    0.37720877,
    0.43747285,
    0.502201,
    0.5595511,
    0.6200012,
    0.68355143,
    0.7502015,
    0.8057536,
    0.8779837,
    0.9379999,
    1.0,
];

/// Volume as a 64-step index, rounded to absorb float noise
pub fn fine_step_index(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * FINE_STEPS as f32).round() as u32
}

/// Whether tick `tick_index` (0..=16) is lit for `volume`
pub fn is_tick_active(tick_index: u32, volume: f32) -> bool {
    fine_step_index(volume) >= tick_index * FINE_STEPS_PER_STANDARD_STEP
}

/// Fill ratio of segment `segment_index` (0..16): 1.0 full, 0.0 empty,
/// quarters in between
pub fn segment_fill_ratio(segment_index: u32, volume: f32) -> f32 {
    let step = fine_step_index(volume);
    let start = segment_index * FINE_STEPS_PER_STANDARD_STEP;
    let end = (segment_index + 1) * FINE_STEPS_PER_STANDARD_STEP;

    if step >= end {
        1.0
    } else if step > start {
        (step - start) as f32 / FINE_STEPS_PER_STANDARD_STEP as f32
    } else {
        0.0
    }
}

/// Tick row under the bar: `|` for lit ticks, `.` otherwise
pub fn render_ticks(volume: f32, is_muted: bool) -> String {
    (0..=STANDARD_STEPS)
        .map(|tick| {
            if !is_muted && is_tick_active(tick, volume) {
                '|'
            } else {
                '.'
            }
        })
        .collect()
}

/// Index of the measured standard level closest to `volume`
pub fn nearest_standard_level(volume: f32) -> usize {
    let mut best = 0;
    let mut best_distance = f32::MAX;
    for (index, level) in STANDARD_VOLUME_LEVELS.iter().enumerate() {
        let distance = (level - volume).abs();
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

/// Text rendering of the 16 segments, e.g. `[████▌           ]`
pub fn render_bar(volume: f32, is_muted: bool) -> String {
    let mut bar = String::with_capacity(STANDARD_STEPS as usize + 2);
    bar.push('[');
    for segment in 0..STANDARD_STEPS {
        let fill = if is_muted {
            0.0
        } else {
            segment_fill_ratio(segment, volume)
        };
        bar.push(if fill >= 1.0 {
            '█'
        } else if fill >= 0.5 {
            '▌'
        } else if fill > 0.0 {
            '▏'
        } else {
            ' '
        });
    }
    bar.push(']');
    bar
}
