use serde::{Deserialize, Serialize};

/// Rows retained after one filter node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCount {
    pub node: String,
    pub rows_out: u64,
}

/// Summary of one terminal materialization.
///
/// Purely observational: nothing in a plan ever reads it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub rows_before: u64,
    pub rows_after: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub chunks: u64,
    /// One entry per filter node, in plan order.
    pub filters: Vec<FilterCount>,
}

impl RunReport {
    pub fn rows_dropped(&self) -> u64 {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Share of input rows that did not survive, in percent. Zero for an empty source.
    pub fn percent_dropped(&self) -> f64 {
        if self.rows_before == 0 {
            return 0.0;
        }
        self.rows_dropped() as f64 / self.rows_before as f64 * 100.0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
