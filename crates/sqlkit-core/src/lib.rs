//! Core types for sqlkit.
//!
//! This crate holds the engine-independent half of the client layer:
//!
//! - [`Error`] and [`ErrorKind`] for every failure a session can report
//! - [`Value`] for parameter binding and result fetching
//! - [`Row`], [`FromValue`] and [`FromRow`] for positional and named decoding
//! - the [`params!`] macro for building parameter slices

pub mod error;
pub mod row;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use row::{ColumnInfo, FromRow, FromValue, Row};
pub use value::Value;
