//! Per-run configuration. All tunables live here; there is no global state.

/// Options accepted by [`crate::analyze`]. Every field has a sensible
/// default; construct with `AnalyzeOptions::default()` and override as
/// needed.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Identifier echoed into the result document; assigned by the caller
    /// (typically the job queue in front of the engine).
    pub job_id: String,
    /// When false, cell values are stripped from the output document (they
    /// are still used internally for flag derivation and resolution).
    pub include_values: bool,
    /// When false, the anomaly pass is skipped entirely.
    pub detect_anomalies: bool,
    /// When false, the cost-driver pass is skipped entirely.
    pub identify_cost_drivers: bool,
    /// How many top drivers to report; clamped to `[1, 500]`.
    pub top_drivers_count: usize,
    /// Ranges covering more cells than this produce a single summary edge
    /// instead of one edge per member.
    pub fan_out_cap: u64,
    /// Half-width of the neighbourhood scanned for `hard_coded_overwrite`.
    pub hardcode_window: u32,
    /// Fraction of formula peers (per axis) that flags a literal cell.
    pub hardcode_ratio: f64,
    /// Minimum peers per axis before `hard_coded_overwrite` can fire.
    pub hardcode_min_peers: usize,
    /// Operator count above which `high_complexity` fires.
    pub complexity_threshold: usize,
    /// Seed for all sampling (betweenness sources, descendant estimation).
    pub sample_seed: u64,
    /// Fold chains of literal strings joined by `&` inside dynamic-function
    /// arguments. Off by default.
    pub fold_string_concat: bool,
    /// Maximum nesting depth when resolving named ranges through other
    /// names.
    pub named_depth_limit: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            job_id: String::new(),
            include_values: true,
            detect_anomalies: true,
            identify_cost_drivers: true,
            top_drivers_count: 50,
            fan_out_cap: 4096,
            hardcode_window: 5,
            hardcode_ratio: 0.6,
            hardcode_min_peers: 3,
            complexity_threshold: 5,
            sample_seed: 0x0051_C057,
            fold_string_concat: false,
            named_depth_limit: 32,
        }
    }
}

impl AnalyzeOptions {
    /// Effective top-K after clamping.
    pub fn clamped_top_drivers(&self) -> usize {
        self.top_drivers_count.clamp(1, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_drivers_clamped() {
        let mut opts = AnalyzeOptions::default();
        assert_eq!(opts.clamped_top_drivers(), 50);
        opts.top_drivers_count = 0;
        assert_eq!(opts.clamped_top_drivers(), 1);
        opts.top_drivers_count = 100_000;
        assert_eq!(opts.clamped_top_drivers(), 500);
    }
}
