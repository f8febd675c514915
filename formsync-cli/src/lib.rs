//! Reconcile form-shaped entity graphs against a relational store.
//!
//! A [`graph::Graph`] holds one node per table slice of a form. Each submit
//! cycle diffs the nodes' original and new data, persists the differences in
//! dependency order through per-table [`store::TableActions`], propagates the
//! real ids of freshly inserted rows into the rows referencing them and
//! folds the persisted rows back into the original data.

pub mod action;
pub mod config;
pub mod form;
pub mod graph;
pub mod naming;
pub mod path;
pub mod record;
pub mod schema;
pub mod store;
