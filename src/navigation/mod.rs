pub mod action;
pub mod navigator;
pub mod note;
pub mod parser;
pub mod prompt;
pub mod state;
