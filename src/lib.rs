// Library root
// -----------
// The binary (`main.rs`) wires these modules into the interactive CLI.
//
// Module responsibilities:
// - `api`: the GitHub REST calls (current user, list/create repository,
//   write file contents) behind the `HostingApi` trait.
// - `session`: the upload flow itself, driven by plain data so it runs
//   without a terminal.
// - `ui`: the `dialoguer` prompts that collect the operator's choices.
// - `config` / `error`: endpoint settings and the failure taxonomy.
pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod ui;

pub use error::{Error, Result};
