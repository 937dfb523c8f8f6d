pub mod json_dump;
pub mod resolve;
pub mod serve;
