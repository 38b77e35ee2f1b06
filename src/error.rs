// Error taxonomy
// FormatError blocks a whole file, DataError blocks one sheet,
// UserInputError is a warning about the current selection.

use thiserror::Error;

/// The uploaded bytes are not a usable workbook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a readable .xlsx workbook: {0}")]
    InvalidContainer(String),

    #[error("sheet '{sheet}' could not be read: {reason}")]
    UnreadableSheet { sheet: String, reason: String },

    #[error("sheet '{0}' has no header row")]
    MissingHeader(String),
}

/// A sheet's content does not fit the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    /// `row` is the 1-based spreadsheet row, header included.
    #[error("sheet '{sheet}', row {row}: '{value}' is not a date")]
    InvalidDate {
        sheet: String,
        row: usize,
        value: String,
    },

    #[error("sheet '{sheet}', row {row}: '{value}' in column '{column}' is not a number")]
    InvalidNumber {
        sheet: String,
        row: usize,
        column: String,
        value: String,
    },
}

impl DataError {
    pub fn sheet(&self) -> &str {
        match self {
            DataError::MissingColumn { sheet, .. }
            | DataError::InvalidDate { sheet, .. }
            | DataError::InvalidNumber { sheet, .. } => sheet,
        }
    }
}

/// Problems with what the user picked, not with the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserInputError {
    #[error("Por favor, selecione ao menos um mês para visualizar.")]
    NoSheetSelected,

    #[error("sheet '{0}' does not exist in this workbook")]
    UnknownSheet(String),
}

impl UserInputError {
    /// Warnings are shown without blocking the session.
    pub fn is_warning(&self) -> bool {
        matches!(self, UserInputError::NoSheetSelected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    UserInput(#[from] UserInputError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
