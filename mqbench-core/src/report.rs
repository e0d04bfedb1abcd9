//! Plain-text latency distribution report.
//!
//! The report is derived only from the [`Summary`] (its sorted latency
//! sequence and totals), so writing it twice yields the same bytes. It is a
//! post-processing step and never runs while requests are being timed.
use crate::{
    nearest_rank, Summary, DEFAULT_BUCKET_COUNT, DEFAULT_REPORT_PERCENTILES,
    HDR_SIGNIFICANT_FIGURES, HDR_TICKS_PER_HALF_DISTANCE, MAX_REPORT_BUCKETS,
};
use hdrhistogram::Histogram;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write latency report: {0}")]
    Io(#[from] io::Error),

    #[error("failed to build latency histogram: {0}")]
    Histogram(String),
}

/// How the latency histogram section is bucketed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Buckets {
    /// Split `[min, max]` into this many equal-width buckets.
    Count(usize),
    /// Fixed-width buckets aligned to multiples of the width.
    Width(Duration),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReportOptions {
    /// Percentiles to print, as fractions in `[0, 1]`.
    pub percentiles: Vec<f64>,
    pub buckets: Buckets,
    /// Append an HdrHistogram percentile distribution table.
    pub hdr_distribution: bool,
    /// Append every successful latency in ascending order.
    pub include_samples: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            percentiles: DEFAULT_REPORT_PERCENTILES.to_vec(),
            buckets: Buckets::Count(DEFAULT_BUCKET_COUNT),
            hdr_distribution: true,
            include_samples: false,
        }
    }
}

impl ReportOptions {
    pub fn percentiles(mut self, percentiles: &[f64]) -> Self {
        self.percentiles = percentiles.to_vec();
        self
    }

    pub fn buckets(mut self, buckets: Buckets) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn hdr_distribution(mut self, enabled: bool) -> Self {
        self.hdr_distribution = enabled;
        self
    }

    pub fn include_samples(mut self, enabled: bool) -> Self {
        self.include_samples = enabled;
        self
    }
}

impl Summary {
    /// Write the latency distribution report to `path`, replacing any
    /// existing file.
    pub fn generate_latency_distribution(
        &self,
        options: &ReportOptions,
        path: impl AsRef<Path>,
    ) -> Result<(), ReportError> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.write_latency_distribution(options, &mut out)?;
        out.flush()?;
        debug!("Latency distribution written to {}", path.display());
        Ok(())
    }

    /// Write the latency distribution report to any sink.
    pub fn write_latency_distribution<W: Write>(
        &self,
        options: &ReportOptions,
        mut out: W,
    ) -> Result<(), ReportError> {
        self.write_header(&mut out)?;

        if self.latencies.is_empty() {
            writeln!(out)?;
            writeln!(out, "# no successful samples")?;
            return Ok(());
        }

        writeln!(out)?;
        self.write_percentiles(options, &mut out)?;
        writeln!(out)?;
        self.write_histogram(options.buckets, &mut out)?;

        if options.hdr_distribution {
            writeln!(out)?;
            self.write_hdr_distribution(&mut out)?;
        }

        if options.include_samples {
            writeln!(out)?;
            writeln!(out, "# Samples (us)")?;
            for latency in &self.latencies {
                writeln!(out, "{:.3}", micros(*latency))?;
            }
        }

        Ok(())
    }

    fn write_header<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "# Latency distribution")?;
        writeln!(out, "# connections: {}", self.connections)?;
        match self.requests_per_second {
            Some(rate) => writeln!(out, "# request rate: {rate:.2}/s")?,
            None => writeln!(out, "# request rate: unlimited")?,
        }
        writeln!(
            out,
            "# issued: {}, succeeded: {}, failed: {}",
            self.total_issued, self.total_succeeded, self.total_failed
        )?;
        writeln!(
            out,
            "# elapsed: {}, throughput: {:.2}/s",
            humantime::format_duration(self.wall_clock),
            self.throughput
        )?;
        for (reason, count) in &self.failure_reasons {
            writeln!(out, "# failure: {count} x {reason}")?;
        }
        Ok(())
    }

    fn write_percentiles<W: Write>(&self, options: &ReportOptions, out: &mut W) -> io::Result<()> {
        writeln!(out, "# Percentiles")?;
        writeln!(out, "{:>12} {:>14}", "Percentile", "Latency(us)")?;
        for &quantile in &options.percentiles {
            if let Some(latency) = nearest_rank(&self.latencies, quantile) {
                writeln!(out, "{:>12.3} {:>14.3}", quantile * 100., micros(latency))?;
            }
        }
        if let Some(stats) = &self.latency {
            writeln!(
                out,
                "# min: {:.3}us, mean: {:.3}us, stddev: {:.3}us, max: {:.3}us",
                micros(stats.min),
                micros(stats.mean),
                micros(stats.stddev),
                micros(stats.max)
            )?;
        }
        Ok(())
    }

    fn write_histogram<W: Write>(&self, buckets: Buckets, out: &mut W) -> io::Result<()> {
        let counts = bucket_counts(&self.latencies, buckets);
        let total = self.latencies.len() as f64;

        writeln!(out, "# Histogram")?;
        writeln!(
            out,
            "{:>14} {:>14} {:>10} {:>12}",
            "From(us)", "To(us)", "Count", "Cumulative%"
        )?;

        let mut cumulative = 0;
        for bucket in counts {
            cumulative += bucket.count;
            writeln!(
                out,
                "{:>14.3} {:>14.3} {:>10} {:>12.3}",
                micros(bucket.lower),
                micros(bucket.upper),
                bucket.count,
                cumulative as f64 / total * 100.
            )?;
        }
        Ok(())
    }

    fn write_hdr_distribution<W: Write>(&self, out: &mut W) -> Result<(), ReportError> {
        let histogram = self.hdr_histogram()?;

        writeln!(out, "# HdrHistogram percentile distribution (us)")?;
        if let Some(interval) = self.expected_interval {
            writeln!(
                out,
                "# corrected for coordinated omission, expected interval {:.3}us",
                micros(interval)
            )?;
        }
        writeln!(
            out,
            "{:>12} {:>14} {:>10} {:>14}",
            "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
        )?;

        let mut total_count = 0;
        for value in histogram.iter_quantiles(HDR_TICKS_PER_HALF_DISTANCE) {
            total_count += value.count_since_last_iteration();
            let quantile = value.quantile_iterated_to();
            if quantile < 1. {
                writeln!(
                    out,
                    "{:>12.3} {:>14.12} {:>10} {:>14.2}",
                    value.value_iterated_to() as f64,
                    quantile,
                    total_count,
                    1. / (1. - quantile)
                )?;
            } else {
                writeln!(
                    out,
                    "{:>12.3} {:>14.12} {:>10}",
                    value.value_iterated_to() as f64,
                    quantile,
                    total_count
                )?;
            }
        }

        writeln!(
            out,
            "#[Mean = {:.3}, StdDeviation = {:.3}]",
            histogram.mean(),
            histogram.stdev()
        )?;
        writeln!(
            out,
            "#[Max = {:.3}, Total count = {}]",
            histogram.max() as f64,
            histogram.len()
        )?;
        Ok(())
    }

    /// Microsecond HdrHistogram of the successful latencies, corrected for
    /// coordinated omission when the run was paced.
    fn hdr_histogram(&self) -> Result<Histogram<u64>, ReportError> {
        let mut histogram = Histogram::<u64>::new(HDR_SIGNIFICANT_FIGURES)
            .map_err(|e| ReportError::Histogram(format!("{e:?}")))?;
        let interval = self.expected_interval.map(whole_micros).unwrap_or(0);

        for latency in &self.latencies {
            histogram
                .record_correct(whole_micros(*latency), interval)
                .map_err(|e| ReportError::Histogram(format!("{e:?}")))?;
        }
        Ok(histogram)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketCount {
    lower: Duration,
    upper: Duration,
    count: u64,
}

fn bucket_counts(sorted: &[Duration], buckets: Buckets) -> Vec<BucketCount> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return vec![];
    };
    let min_ns = min.as_nanos();
    let max_ns = max.as_nanos();

    let (start, width, count) = match buckets {
        Buckets::Count(count) => {
            let count = count.clamp(1, MAX_REPORT_BUCKETS);
            let span = max_ns - min_ns;
            let width = (span / count as u128 + u128::from(span % count as u128 != 0)).max(1);
            (min_ns, width, count)
        }
        Buckets::Width(width) => {
            let width = width.as_nanos().max(1);
            let start = min_ns / width * width;
            let needed = (max_ns - start) / width + 1;
            let count = usize::try_from(needed)
                .unwrap_or(usize::MAX)
                .min(MAX_REPORT_BUCKETS);
            if (count as u128) < needed {
                warn!("Bucket width too small for latency range; capping at {MAX_REPORT_BUCKETS} buckets.");
            }
            (start, width, count)
        }
    };

    let mut counts: Vec<BucketCount> = (0..count)
        .map(|idx| BucketCount {
            lower: crate::stats::duration_from_nanos(start + width * idx as u128),
            upper: crate::stats::duration_from_nanos(start + width * (idx as u128 + 1)),
            count: 0,
        })
        .collect();

    for latency in sorted {
        let idx = ((latency.as_nanos() - start) / width).min(count as u128 - 1) as usize;
        counts[idx].count += 1;
    }

    counts
}

fn micros(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e6
}

fn whole_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
