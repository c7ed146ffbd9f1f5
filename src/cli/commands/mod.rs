pub mod chat;
pub mod decision;
pub mod edit;
pub mod export;
pub mod generate;
pub mod init;
pub mod status;
