pub mod jsonrpc;
pub mod tools;
