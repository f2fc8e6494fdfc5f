pub mod chat;
pub mod doctor;
pub mod init;
pub mod models;
pub mod plan;
pub mod run;
