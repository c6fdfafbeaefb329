use crate::error::LoadError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// The student records table, loaded once and never modified
///
/// Cells are kept as the strings found in the file; the statistics module
/// decides which columns must be numeric. The table also carries its own CSV
/// serialization (header included, no row index) so the prompt can embed the
/// whole dataset without re-serializing on every request.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    csv_text: String,
}

impl Dataset {
    /// Load a dataset from a CSV file
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to load
    ///
    /// # Returns
    /// * `Result<Dataset, LoadError>` - The loaded table or an error
    ///
    /// # Examples
    /// ```no_run
    /// use student_insights::dataset::Dataset;
    ///
    /// match Dataset::from_path("students.csv") {
    ///     Ok(data) => println!("Loaded {} students", data.len()),
    ///     Err(e) => eprintln!("Error loading CSV: {}", e),
    /// }
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a dataset from any CSV source
    ///
    /// Every row must have as many fields as the header; a ragged file is
    /// rejected rather than padded.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(LoadError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let csv_text = serialize(&headers, &rows)?;

        Ok(Dataset {
            headers,
            rows,
            csv_text,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows (the header is not counted)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact header name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All cells of one column, in row order
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// The full table as CSV text, header first
    pub fn as_csv(&self) -> &str {
        &self.csv_text
    }
}

fn serialize(headers: &[String], rows: &[Vec<String>]) -> Result<String, LoadError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LoadError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| LoadError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
