pub mod archive;
pub mod commands;
pub mod package;
pub mod paths;
pub mod runtime;
