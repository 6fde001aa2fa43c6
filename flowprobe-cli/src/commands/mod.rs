pub mod port;
pub mod profile;
pub mod run;
