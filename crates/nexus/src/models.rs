//! These models represent the objects passed around by the agent loop
//!
//! There are two wire formats we need to interact with:
//! - chat-completion messages/tools, sent from the agent to the model endpoint
//! - JSON-RPC tool catalogs and tool results, exchanged with compute providers
//!
//! Both are converted into these internal structs at the boundary. A conversation lives only
//! for the duration of one task and is replayed verbatim to the model on every call.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
pub mod update;
