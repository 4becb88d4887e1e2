//! Request template predicates.
//!
//! - `field_matcher` - literal values and matcher expressions, and their interpreter
//! - `json` - structured JSON comparison used by body matchers
//! - `template` - compiled templates evaluated field by field

mod field_matcher;
mod json;
mod template;

pub use field_matcher::{CompiledMatcher, FieldMatcher, Matcher};
pub use json::{canonical_json, json_subset};
pub use template::{CompiledTemplate, LiveRequest, MatchScore, RequestField};
