//! QnA relay bot library: relay, answer providers, channels, and gateway
//! shared by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod qna;
pub mod relay;
