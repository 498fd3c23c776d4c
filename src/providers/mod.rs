mod http_errors;
pub mod openai;
mod sse;
