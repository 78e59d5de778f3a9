pub mod auth;
pub mod claude;
pub mod endpoint;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod sse;
pub mod stream;
