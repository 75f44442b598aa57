//! seqsync wire protocol
//!
//! Every inbound message is one JSON object describing a sequence operation:
//!
//! ```text
//! {"type":"Insert","after":"head","id":"alice:1","value":"H","timestamp":"1"}
//! {"type":"Delete","id":"alice:1"}
//! ```
//!
//! Every outbound message is the full visible document:
//!
//! ```text
//! [{"id":"alice:1","value":"H"},{"id":"alice:2","value":"i"}]
//! ```
//!
//! WebSocket carries one message per text frame; TCP carries one message
//! per line.

pub mod error;
pub mod message;
pub mod parser;
pub mod response;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{encode_operation, parse_operation, WireMessage, MAX_MESSAGE_SIZE};
pub use parser::LineParser;
pub use response::DocumentPush;
