use crate::dataset::Dataset;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Columns the dashboard cannot be computed without
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "Name",
    "Class",
    "Marks_Math",
    "Marks_Science",
    "Marks_English",
];

/// Subject label paired with the column holding its marks
pub const SUBJECTS: [(&str, &str); 3] = [
    ("Math", "Marks_Math"),
    ("Science", "Marks_Science"),
    ("English", "Marks_English"),
];

/// Optional column; when present its mean is reported as well
pub const ATTENDANCE_COLUMN: &str = "Attendance";

/// How many students the leaderboard shows
pub const TOP_PERFORMERS: usize = 5;

/// One leaderboard entry, projected from a table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub name: String,
    pub class: String,
    pub marks_math: Option<f64>,
    pub marks_science: Option<f64>,
    pub marks_english: Option<f64>,
    /// Sum of the marks that are present
    pub total: f64,
}

/// Aggregate view over the whole table, rebuilt on every page view
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_students: usize,
    pub class_distribution: BTreeMap<String, usize>,
    /// Subject label -> mean mark, rounded to 2 decimals
    pub subject_averages: BTreeMap<String, f64>,
    pub top_performers: Vec<TopPerformer>,
    /// Class -> subject label -> mean mark, rounded to 2 decimals
    pub class_performance: BTreeMap<String, BTreeMap<String, f64>>,
    pub average_attendance: Option<f64>,
}

/// Why the dashboard could not be computed
///
/// This is returned as a value and rendered in place of the statistics; it
/// never aborts the request.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Required columns absent from the header, in `REQUIRED_COLUMNS` order
    MissingColumns(Vec<String>),

    /// A numeric column held a value that is not a number (`row` is 1-based)
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::MissingColumns(columns) => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            StatsError::NonNumeric { column, row, value } => {
                write!(f, "Column {column} has a non-numeric value {value:?} in row {row}")
            }
        }
    }
}

impl std::error::Error for StatsError {}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Running sum/count pair for a mean that skips missing values
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn rounded(&self) -> Option<f64> {
        (self.count > 0).then(|| round2(self.sum / self.count as f64))
    }
}

/// Parse a numeric cell; empty and NaN cells are missing values
fn parse_cell(column: &str, row: usize, raw: &str) -> Result<Option<f64>, StatsError> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(StatsError::NonNumeric {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        }),
    }
}

/// Compute the dashboard statistics for a table
///
/// # Arguments
/// * `data` - The loaded student records
///
/// # Returns
/// * `Result<DashboardStats, StatsError>` - The statistics, or a description of
///   why they cannot be computed from this table
pub fn summarize(data: &Dataset) -> Result<DashboardStats, StatsError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| data.column_index(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StatsError::MissingColumns(missing));
    }

    // Both lookups are guaranteed by the check above.
    let name_idx = data.column_index("Name").unwrap_or_default();
    let class_idx = data.column_index("Class").unwrap_or_default();
    let subject_idx: Vec<usize> = SUBJECTS
        .iter()
        .filter_map(|(_, column)| data.column_index(column))
        .collect();
    let attendance_idx = data.column_index(ATTENDANCE_COLUMN);

    let mut class_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut subject_means = [Mean::default(); 3];
    let mut class_means: BTreeMap<String, [Mean; 3]> = BTreeMap::new();
    let mut attendance = Mean::default();
    let mut candidates: Vec<TopPerformer> = Vec::with_capacity(data.len());

    for (i, row) in data.rows().iter().enumerate() {
        let row_no = i + 1;
        let class = &row[class_idx];

        let mut marks = [None; 3];
        for (slot, (&idx, (_, column))) in subject_idx.iter().zip(SUBJECTS.iter()).enumerate() {
            marks[slot] = parse_cell(column, row_no, &row[idx])?;
        }
        if let Some(idx) = attendance_idx {
            attendance.push(parse_cell(ATTENDANCE_COLUMN, row_no, &row[idx])?);
        }

        *class_distribution.entry(class.clone()).or_insert(0) += 1;
        let per_class = class_means.entry(class.clone()).or_default();
        for slot in 0..3 {
            subject_means[slot].push(marks[slot]);
            per_class[slot].push(marks[slot]);
        }

        let performer = TopPerformer {
            name: row[name_idx].clone(),
            class: class.clone(),
            marks_math: marks[0],
            marks_science: marks[1],
            marks_english: marks[2],
            total: marks.iter().flatten().sum(),
        };
        if !candidates.contains(&performer) {
            candidates.push(performer);
        }
    }

    // Stable sort keeps input order between equal totals.
    candidates.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(TOP_PERFORMERS);

    let subject_averages = averages_by_subject(&subject_means);
    let class_performance = class_means
        .into_iter()
        .map(|(class, means)| (class, averages_by_subject(&means)))
        .collect();

    Ok(DashboardStats {
        total_students: data.len(),
        class_distribution,
        subject_averages,
        top_performers: candidates,
        class_performance,
        average_attendance: attendance.rounded(),
    })
}

fn averages_by_subject(means: &[Mean; 3]) -> BTreeMap<String, f64> {
    SUBJECTS
        .iter()
        .zip(means.iter())
        .filter_map(|((label, _), mean)| mean.rounded().map(|m| (label.to_string(), m)))
        .collect()
}

/// Plain-text summary of the headline numbers, one per line
pub fn render_summary(stats: &DashboardStats) -> String {
    let mut summary = format!("Total Students: {}\n", stats.total_students);
    for (label, _) in SUBJECTS.iter() {
        if let Some(avg) = stats.subject_averages.get(*label) {
            summary.push_str(&format!("Average {label} Marks: {avg:.2}\n"));
        }
    }
    if let Some(avg) = stats.average_attendance {
        summary.push_str(&format!("Average Attendance: {avg:.2}%\n"));
    }
    summary
}
