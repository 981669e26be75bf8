//! Utility functions and types

pub mod data_loader;

pub use data_loader::{sample_rows, save_csv, take_rows, write_submission, DataLoader};
