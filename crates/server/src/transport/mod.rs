pub mod http;
pub mod stdio;
