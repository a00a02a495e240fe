pub mod mover;

pub use mover::{unique_destination, SortReport, Sorter, MAX_REPORTED_ERRORS};
