/// Percentiles (as fractions) printed by the distribution report by default.
pub const DEFAULT_REPORT_PERCENTILES: [f64; 7] = [0.5, 0.75, 0.9, 0.95, 0.99, 0.999, 1.0];

/// Number of histogram buckets in the distribution report by default.
pub const DEFAULT_BUCKET_COUNT: usize = 20;

/// Hard ceiling on histogram buckets when a fixed bucket width is requested.
pub const MAX_REPORT_BUCKETS: usize = 10_000;

/// Upper bound on the sample buffer a worker reserves before its first request.
pub const MAX_PREALLOCATED_SAMPLES: usize = 1 << 16;

pub const HDR_SIGNIFICANT_FIGURES: u8 = 3;
pub const HDR_TICKS_PER_HALF_DISTANCE: u32 = 5;
