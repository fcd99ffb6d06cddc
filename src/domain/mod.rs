//! Core domain types and logic.

pub mod aggregation;
pub mod alert;
pub mod config_validation;
pub mod engine;
pub mod entity;
pub mod error;
pub mod expr;
pub mod expr_eval;
pub mod expr_parser;
pub mod fields;
pub mod formula;
pub mod history;
pub mod solver;
pub mod tick;
pub mod value;
