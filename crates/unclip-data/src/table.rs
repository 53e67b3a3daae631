//! Image/caption record table loading.
//!
//! The table is read once, fully, into memory. Only the `image_name` and
//! `caption` columns are used; any other columns are ignored.

use arrow::array::{Array as ArrowArray, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unclip_core::{Result, UnclipError};

/// Column holding the image path.
pub const IMAGE_COLUMN: &str = "image_name";
/// Column holding the caption text.
pub const CAPTION_COLUMN: &str = "caption";

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Path to the image, used as written in the table.
    pub image_name: PathBuf,
    /// Caption text.
    pub caption: String,
}

impl Record {
    /// Create a record.
    pub fn new(image_name: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            caption: caption.into(),
        }
    }
}

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Delimited text with a header row.
    Delimited {
        /// Field delimiter.
        delimiter: u8,
    },
    /// Apache Parquet.
    Parquet,
}

impl TableFormat {
    /// Detect the format from the file extension.
    ///
    /// `.parquet`/`.pq` are Parquet, `.tsv` is tab-delimited, anything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("parquet") | Some("pq") => TableFormat::Parquet,
            Some("tsv") => TableFormat::Delimited { delimiter: b'\t' },
            _ => TableFormat::Delimited { delimiter: b',' },
        }
    }
}

/// Immutable in-memory table of image/caption records.
#[derive(Debug, Clone)]
pub struct RecordTable {
    records: Vec<Record>,
}

impl RecordTable {
    /// Build a table from records already in memory.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        if records.is_empty() {
            return Err(UnclipError::Table("table has no rows".into()));
        }
        Ok(Self { records })
    }

    /// Load a table, detecting the format from the extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::load_with_format(path, TableFormat::from_path(path))
    }

    /// Load a table in an explicit format.
    pub fn load_with_format<P: AsRef<Path>>(path: P, format: TableFormat) -> Result<Self> {
        let path = path.as_ref();
        let batches = match format {
            TableFormat::Delimited { delimiter } => read_delimited(path, delimiter)?,
            TableFormat::Parquet => read_parquet(path)?,
        };

        let mut records = Vec::new();
        for batch in &batches {
            extract_records(batch, &mut records)?;
        }

        if records.is_empty() {
            return Err(UnclipError::Table(format!("{} has no rows", path.display())));
        }
        let table = Self { records };
        tracing::info!("Loaded {} records from {}", table.len(), path.display());
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row at `index`.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// All rows.
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        UnclipError::Table(format!("Failed to open table {}: {}", path.display(), e))
    })
}

/// Read a delimited file with every column typed as UTF-8.
fn read_delimited(path: &Path, delimiter: u8) -> Result<Vec<RecordBatch>> {
    let format = arrow::csv::reader::Format::default()
        .with_header(true)
        .with_delimiter(delimiter);

    let (inferred, _) = format.infer_schema(open(path)?, Some(1)).map_err(|e| {
        UnclipError::Table(format!("Failed to read header of {}: {}", path.display(), e))
    })?;

    // Captions that look numeric must stay text.
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    let schema: SchemaRef = Arc::new(Schema::new(fields));
    require_columns(&schema, path)?;

    let reader = arrow::csv::ReaderBuilder::new(schema)
        .with_header(true)
        .with_delimiter(delimiter)
        .build(open(path)?)
        .map_err(|e| {
            UnclipError::Table(format!("Failed to create CSV reader for {}: {}", path.display(), e))
        })?;

    reader
        .map(|batch| {
            batch.map_err(|e| {
                UnclipError::Table(format!("Failed to parse {}: {}", path.display(), e))
            })
        })
        .collect()
}

fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?).map_err(|e| {
        UnclipError::Table(format!("Failed to create Parquet reader: {}", e))
    })?;
    require_columns(builder.schema(), path)?;

    let reader = builder.build().map_err(|e| {
        UnclipError::Table(format!("Failed to build Parquet reader: {}", e))
    })?;

    reader
        .map(|batch| {
            batch.map_err(|e| UnclipError::Table(format!("Failed to read Parquet batch: {}", e)))
        })
        .collect()
}

fn require_columns(schema: &SchemaRef, path: &Path) -> Result<()> {
    for column in [IMAGE_COLUMN, CAPTION_COLUMN] {
        if schema.index_of(column).is_err() {
            return Err(UnclipError::Table(format!(
                "Column '{}' not found in {}. Available columns: {:?}",
                column,
                path.display(),
                schema.fields().iter().map(|f| f.name()).collect::<Vec<_>>()
            )));
        }
    }
    Ok(())
}

/// Cast a column to UTF-8 so dictionary, large and view string encodings all read the same way.
fn string_column(batch: &RecordBatch, name: &str) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| UnclipError::Table(format!("Column '{}' missing from batch", name)))?;

    arrow::compute::cast(column, &DataType::Utf8).map_err(|e| {
        UnclipError::Table(format!("Column '{}' is not convertible to text: {}", name, e))
    })
}

fn extract_records(batch: &RecordBatch, out: &mut Vec<Record>) -> Result<()> {
    let images = string_column(batch, IMAGE_COLUMN)?;
    let captions = string_column(batch, CAPTION_COLUMN)?;

    let images = images
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| UnclipError::Table(format!("Column '{}' is not a string type", IMAGE_COLUMN)))?;
    let captions = captions
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            UnclipError::Table(format!("Column '{}' is not a string type", CAPTION_COLUMN))
        })?;

    out.reserve(batch.num_rows());
    for i in 0..batch.num_rows() {
        // Nulls are not rejected here: a missing path fails when the image is opened.
        let image_name = if images.is_null(i) { "" } else { images.value(i) };
        let caption = if captions.is_null(i) { "" } else { captions.value(i) };
        out.push(Record::new(image_name, caption));
    }
    Ok(())
}
