use rand::Rng;

/// Daily counts above this require an explicit confirmation from the user
/// before generation runs. The generator itself does not enforce the gate.
pub const HIGH_VOLUME_THRESHOLD: u32 = 200;

/// Draws `count` independent uniform times (minutes since midnight) from the
/// inclusive window `[start_minutes, end_minutes]` and returns them sorted
/// ascending. Duplicates are possible and acceptable; slots are not evenly
/// spaced. Callers must reject inverted windows before calling.
pub fn generate_slot_times(start_minutes: u32, end_minutes: u32, count: u32) -> Vec<u32> {
    let mut rng = rand::rng();
    let mut times = (0..count)
        .map(|_| rng.random_range(start_minutes..=end_minutes))
        .collect::<Vec<_>>();
    times.sort_unstable();
    times
}
