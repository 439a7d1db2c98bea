//! Deterministic edit scripts.
//!
//! A script is a YAML document: initial markup, optional settings and a list
//! of `type`-tagged steps. Scripts exercise the editing core end to end
//! without a browser:
//!
//! ```yaml
//! name: color survives reload
//! document: '<main><p id="p">Hi</p></main>'
//! steps:
//!   - type: style
//!     target: "#p"
//!     property: color
//!     value: red
//!   - type: verify_start
//!   - type: regenerate
//!     target: "#p"
//!     html: '<p id="p" style="color: red;">Hi</p>'
//!   - type: advance
//!     ms: 500
//!   - type: expect
//!     outcome: verified
//! ```

mod runner;
mod schema;

pub use runner::{ScriptReport, ScriptRunner, StepReport};
pub use schema::{EditScript, Expectation, Step};
