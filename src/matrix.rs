/// Financing matrix: loading, header normalization and the load-once cache.
///
/// The matrix is a spreadsheet (or its CSV export) with one row per offer
/// and one `X`-marker column per sales bucket. It is read once per process
/// and shared read-only by every request.
use crate::errors::AppError;
use calamine::{open_workbook_auto, Reader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

// Accepted header spellings per semantic column, in precedence order.
pub const INSTITUTION_COLUMNS: &[&str] = &["Financiera", "Nombre", "Institución", "Institucion"];
pub const TYPE_COLUMNS: &[&str] = &[
    "Tipo de financiamiento",
    "Tipo de Financiamiento",
    "Tipo",
    "Producto",
];
pub const BENEFIT_COLUMNS: &[&str] = &[
    "Como ayuda este financiamiento",
    "Cómo ayuda este financiamiento",
    "Ventaja",
    "Beneficio",
];
pub const AMOUNT_COLUMNS: &[&str] = &["Montos en pesos", "Monto", "Montos"];
pub const TERM_COLUMNS: &[&str] = &["Plazos", "Plazo"];
pub const AGE_COLUMNS: &[&str] = &["Antigúedad", "Antigüedad", "Antiguedad", "Años de operación"];

/// In-memory financing matrix with trimmed headers and cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl OfferTable {
    /// Builds a table, trimming every header and cell.
    ///
    /// Rows are padded (or cut) to the header width and fully blank rows are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(|c| c.trim().to_string()).collect();
                cells.resize(width, String::new());
                cells
            })
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .collect();

        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column whose header equals `name` exactly.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of the first candidate header present in the table.
    pub fn resolve_column(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|candidate| self.column_index(candidate))
    }

    /// Cell text, or `""` when the column is absent.
    pub fn cell(&self, row: usize, column: Option<usize>) -> &str {
        column
            .and_then(|c| self.rows.get(row).and_then(|cells| cells.get(c)))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Semantic columns resolved against a table's actual headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub institution: Option<usize>,
    pub financing_type: Option<usize>,
    pub benefit: Option<usize>,
    pub amount: Option<usize>,
    pub term: Option<usize>,
    pub age_requirement: Option<usize>,
}

impl ColumnMap {
    pub fn resolve(table: &OfferTable) -> Self {
        Self {
            institution: table.resolve_column(INSTITUTION_COLUMNS),
            financing_type: table.resolve_column(TYPE_COLUMNS),
            benefit: table.resolve_column(BENEFIT_COLUMNS),
            amount: table.resolve_column(AMOUNT_COLUMNS),
            term: table.resolve_column(TERM_COLUMNS),
            age_requirement: table.resolve_column(AGE_COLUMNS),
        }
    }

    /// Materializes row `index` into an owned [`OfferRow`].
    pub fn offer_row(&self, table: &OfferTable, index: usize) -> OfferRow {
        OfferRow {
            institution: table.cell(index, self.institution).to_string(),
            financing_type: table.cell(index, self.financing_type).to_string(),
            benefit: table.cell(index, self.benefit).to_string(),
            amount: table.cell(index, self.amount).to_string(),
            term: table.cell(index, self.term).to_string(),
            age_requirement: table.cell(index, self.age_requirement).to_string(),
        }
    }
}

/// One financing offer from the matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferRow {
    pub institution: String,
    pub financing_type: String,
    pub benefit: String,
    pub amount: String,
    pub term: String,
    pub age_requirement: String,
}

/// Reads the matrix file at `path`.
///
/// Spreadsheets (`xlsx`, `xlsm`, `xls`, `ods`) are read from their first
/// worksheet; `csv` files from their header row. Blocking: call from
/// `spawn_blocking` inside the runtime.
pub fn load_matrix(path: &Path) -> Result<OfferTable, AppError> {
    if !path.exists() {
        tracing::error!("Matrix file not found: {}", path.display());
        return Err(AppError::DataSourceMissing(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => load_workbook(path)?,
        "csv" => load_csv(path)?,
        other => {
            return Err(AppError::MatrixRead(format!(
                "Unsupported matrix format '{}' for {}",
                other,
                path.display()
            )))
        }
    };

    tracing::info!(
        "Matrix loaded from {}: {} rows x {} columns",
        path.display(),
        table.len(),
        table.headers().len()
    );
    Ok(table)
}

fn load_workbook(path: &Path) -> Result<OfferTable, AppError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::MatrixRead("Workbook has no worksheets".to_string()))??;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| AppError::MatrixRead("Worksheet is empty".to_string()))?;

    Ok(OfferTable::new(headers, rows.collect()))
}

fn load_csv(path: &Path) -> Result<OfferTable, AppError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }

    Ok(OfferTable::new(headers, rows))
}

/// Load-once, read-many holder for the matrix.
///
/// The first successful [`MatrixCache::get`] populates the slot; concurrent
/// first callers wait on the same load. Failed loads are not cached.
#[derive(Debug)]
pub struct MatrixCache {
    path: PathBuf,
    table: OnceCell<Arc<OfferTable>>,
}

impl MatrixCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: OnceCell::new(),
        }
    }

    /// Cache already holding `table`; the path is informational only.
    pub fn preloaded(path: impl Into<PathBuf>, table: OfferTable) -> Self {
        Self {
            path: path.into(),
            table: OnceCell::from(Arc::new(table)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a matrix is available, either cached or on disk.
    pub fn is_available(&self) -> bool {
        self.table.initialized() || self.path.exists()
    }

    pub async fn get(&self) -> Result<Arc<OfferTable>, AppError> {
        self.table
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let table = tokio::task::spawn_blocking(move || load_matrix(&path)).await??;
                Ok::<_, AppError>(Arc::new(table))
            })
            .await
            .map(Arc::clone)
    }
}
