//! Data model shared by the engine and its collaborators.
//!
//! - `body` - text and base64 body encodings
//! - `request` - concrete requests and request templates
//! - `response` - responses
//! - `pair` - concrete exchanges and stored template pairs
//! - `simulation` - the exportable/importable snapshot

mod body;
mod pair;
mod request;
mod response;
mod simulation;

pub use body::{decode_body, encode_body, BodyMode};
pub use pair::{RequestResponsePair, TemplatePair};
pub use request::{canonical_query, Headers, RequestDetails, RequestTemplate};
pub use response::ResponseDetails;
pub use simulation::{GlobalActions, Simulation, SimulationData, SimulationMeta, SCHEMA_VERSION};
