//! Static column declarations for the US accidents dataset.
//!
//! The catalog only names columns. Whether a name exists in a given file is
//! decided later, by [`LazyTable::drop`](crate::plan::LazyTable::drop) and by
//! the projection optimizer, so a catalog can be shared across files whose
//! headers drift.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Which columns to discard, which must be non-null, and which downstream
/// consumers need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default = "default_columns_to_drop")]
    pub columns_to_drop: BTreeSet<String>,
    /// Null filters, applied in this order.
    #[serde(default = "default_required_non_null")]
    pub required_non_null: Vec<Vec<String>>,
    #[serde(default = "default_minimal_columns")]
    pub minimal_columns: Vec<String>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn default_columns_to_drop() -> BTreeSet<String> {
    owned(&[
        "ID",
        "Source",
        "Description",
        "Country",
        "Zipcode",
        "Airport_Code",
        "Wind_Chill(F)",
        "Precipitation(in)",
        "Civil_Twilight",
        "Nautical_Twilight",
        "Astronomical_Twilight",
        "Timezone",
        "Weather_Timestamp",
    ])
    .into_iter()
    .collect()
}

fn default_required_non_null() -> Vec<Vec<String>> {
    vec![
        owned(&["End_Lat", "End_Lng"]),
        owned(&[
            "Temperature(F)",
            "Weather_Condition",
            "Sunrise_Sunset",
            "City",
            "Street",
        ]),
    ]
}

fn default_minimal_columns() -> Vec<String> {
    owned(&[
        "Severity",
        "Start_Time",
        "Start_Lat",
        "Start_Lng",
        "City",
        "Weather_Condition",
        "Temperature(F)",
        "Humidity(%)",
        "Junction",
        "Crossing",
        "Traffic_Signal",
        "Stop",
        "Station",
        "Amenity",
        "Bump",
        "Give_Way",
        "No_Exit",
        "Roundabout",
    ])
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self {
            columns_to_drop: default_columns_to_drop(),
            required_non_null: default_required_non_null(),
            minimal_columns: default_minimal_columns(),
        }
    }
}

/// What the dashboard needs from every file it reads: either the raw
/// timestamp, or all of the time components it would otherwise derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerContract {
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_derived_columns")]
    pub derived_columns: Vec<String>,
}

fn default_timestamp_column() -> String {
    "Start_Time".to_string()
}

fn default_derived_columns() -> Vec<String> {
    owned(&["Hour", "Month", "DayOfWeek"])
}

impl Default for ConsumerContract {
    fn default() -> Self {
        Self {
            timestamp_column: default_timestamp_column(),
            derived_columns: default_derived_columns(),
        }
    }
}

impl ConsumerContract {
    pub fn satisfied_by<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        let has = |name: &str| columns.iter().any(|c| c.as_ref() == name);
        has(&self.timestamp_column) || self.derived_columns.iter().all(|d| has(d))
    }
}
