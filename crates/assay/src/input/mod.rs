//! Upload validation and table parsing.

mod table;
mod validator;

pub use table::{Row, Table, Upload, Value, fingerprint, is_null_value};
pub use validator::FileValidator;
