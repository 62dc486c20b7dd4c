//! cfgdex: function index and diagnostics for mission config files
//!
//! This crate provides the core of the `cfgdex` language server, which reads
//! the `CfgFunctions` registry of `description.ext` files (and everything they
//! `#include`) and offers editor support for the functions it declares.
//!
//! # Overview
//!
//! - **Indexing**: every `description.ext` in the workspace is parsed and its
//!   registry resolved to qualified names and script files
//! - **Diagnostics**: syntax errors and function files that do not exist
//! - **Completion**: function names in scripts, documented properties in root files
//! - **Hover**: call signatures from function header comments, property docs
//! - **Go-to-definition**: from a function name to its script
//!
//! # Architecture
//!
//! - [`config_tree`]: the config file parser and its tree
//! - [`function_index`]: registry resolution for one parsed root
//! - [`workspace`]: discovery, buffers and the per-root function tables
//! - [`reparse`]: debounced re-indexing on edits
//! - [`completion`], [`hover`], [`gotodef`]: read-only queries
//!
//! ```ignore
//! use cfgdex::config::Settings;
//! use cfgdex::workspace::Workspace;
//!
//! let workspace = Workspace::new(&mission_dir, Settings::default());
//! let diagnostics = workspace.index_workspace();
//! let record = workspace.find_function("TAG_fnc_doThing");
//! ```

// Indexing
pub mod config_tree;
pub mod docstring;
pub mod function_index;
pub mod paths;
pub mod reparse;
pub mod workspace;

// LSP feature modules
pub mod completion;
pub mod diagnostics;
pub mod document;
pub mod gotodef;
pub mod hover;

// Configuration and bundled data
pub mod config;
pub mod description_docs;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
