//! Core type definitions for the muninn gateway.

pub mod credential;
pub mod message;
pub mod options;
pub mod process;
pub mod response;

pub use credential::Credential;
pub use message::{Message, Role};
pub use options::ChatOptions;
pub use process::{ProcessRequest, ProcessResponse, StreamEvent};
pub use response::{ChatResponse, FinishReason, Usage};
